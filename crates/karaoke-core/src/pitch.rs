//! Semitone shift parameters for the transcoder filter graph

use crate::config::PitchConfig;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchShift {
    pub semitones: i32,
    /// Nominal sample rate the output is resampled back to
    pub sample_rate: u32,
}

impl PitchShift {
    pub fn new(semitones: i32, sample_rate: u32) -> Self {
        Self { semitones, sample_rate }
    }

    /// Parse and range-check a raw form value
    pub fn from_field(raw: &str, cfg: &PitchConfig) -> CoreResult<Self> {
        let semitones = parse_semitones(raw, cfg.min_semitones, cfg.max_semitones)?;
        Ok(Self::new(semitones, cfg.sample_rate))
    }

    /// Playback-rate multiplier `2^(s/12)`
    pub fn rate(&self) -> f64 {
        2f64.powf(self.semitones as f64 / 12.0)
    }

    /// Tempo correction undoing the speed change of [`rate`](Self::rate)
    pub fn tempo(&self) -> f64 {
        1.0 / self.rate()
    }

    /// `asetrate` target in Hz
    pub fn shifted_sample_rate(&self) -> u32 {
        (self.sample_rate as f64 * self.rate()).round() as u32
    }

    /// `-af` argument: normalise the input to the nominal rate, relabel it by `r`, resample
    /// back, then stretch tempo by `1/r`.
    ///
    /// `asetrate` relabels whatever rate the decoder delivers; the leading `aresample` pins that
    /// to `sample_rate` so a 48 kHz upload shifts the same as a 44.1 kHz one. `atempo` accepts
    /// [0.5, 2.0], which covers a full octave either way.
    pub fn filter_graph(&self) -> String {
        format!(
            "aresample={sr},asetrate={},aresample={sr},atempo={:.6}",
            self.shifted_sample_rate(),
            self.tempo(),
            sr = self.sample_rate,
        )
    }
}

/// Integer semitone offset within `[min, max]`.
///
/// Accepts integral decimals such as `"2.0"`; rejects anything non-numeric or fractional.
pub fn parse_semitones(raw: &str, min: i32, max: i32) -> CoreResult<i32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidSemitones("value is missing".into()));
    }

    let value = match trimmed.parse::<i32>() {
        Ok(v) => v,
        Err(_) => {
            let f: f64 = trimmed
                .parse()
                .map_err(|_| CoreError::InvalidSemitones(format!("{trimmed:?} is not a number")))?;
            if !f.is_finite() || f.fract() != 0.0 || f.abs() > i32::MAX as f64 {
                return Err(CoreError::InvalidSemitones(format!(
                    "{trimmed:?} is not a whole number"
                )));
            }
            f as i32
        }
    };

    if !(min..=max).contains(&value) {
        return Err(CoreError::InvalidSemitones(format!(
            "{value} is outside [{min}, {max}]"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rate_and_tempo_for_full_range() {
        for s in -6..=6 {
            let shift = PitchShift::new(s, 44_100);
            assert_relative_eq!(shift.rate(), 2f64.powf(s as f64 / 12.0), epsilon = 1e-12);
            assert_relative_eq!(shift.tempo() * shift.rate(), 1.0, epsilon = 1e-12);
            assert!((0.5..=2.0).contains(&shift.tempo()));
        }
    }

    #[test]
    fn test_zero_is_identity() {
        let shift = PitchShift::new(0, 48_000);
        assert_relative_eq!(shift.rate(), 1.0);
        assert_eq!(shift.filter_graph(), "aresample=48000,asetrate=48000,aresample=48000,atempo=1.000000");
    }

    #[test]
    fn test_filter_graph_for_one_step_up() {
        let shift = PitchShift::new(1, 44_100);
        // 44100 * 2^(1/12) = 46722.3...
        assert_eq!(shift.shifted_sample_rate(), 46_722);
        assert_eq!(shift.filter_graph(), "aresample=44100,asetrate=46722,aresample=44100,atempo=0.943874");
    }

    #[test]
    fn test_graph_normalises_input_rate_first() {
        for s in -6..=6 {
            let graph = PitchShift::new(s, 44_100).filter_graph();
            let filters: Vec<&str> = graph.split(',').collect();
            assert_eq!(filters[0], "aresample=44100", "{graph}");
            assert!(filters[1].starts_with("asetrate="), "{graph}");
            assert_eq!(filters[2], "aresample=44100", "{graph}");
        }
    }

    /// Pitch and duration factors after running `graph` over a source at `source_rate` Hz.
    ///
    /// `aresample` keeps the content and changes the rate, `asetrate` relabels the rate (pitch
    /// and speed move together) and `atempo` changes speed only.
    fn apply_graph(graph: &str, source_rate: f64) -> (f64, f64) {
        let (mut rate, mut pitch, mut duration) = (source_rate, 1.0, 1.0);
        for filter in graph.split(',') {
            let (name, value) = filter.split_once('=').unwrap();
            let value: f64 = value.parse().unwrap();
            match name {
                "aresample" => rate = value,
                "asetrate" => {
                    pitch *= value / rate;
                    duration *= rate / value;
                    rate = value;
                }
                "atempo" => duration /= value,
                other => panic!("unexpected filter {other}"),
            }
        }
        (pitch, duration)
    }

    #[test]
    fn test_pitch_and_duration_independent_of_source_rate() {
        for source_rate in [22_050.0, 44_100.0, 48_000.0, 96_000.0] {
            for s in -6..=6 {
                let shift = PitchShift::new(s, 44_100);
                let (pitch, duration) = apply_graph(&shift.filter_graph(), source_rate);
                assert_relative_eq!(pitch, shift.rate(), epsilon = 1e-4);
                assert_relative_eq!(duration, 1.0, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_parse_accepts_integers_in_range() {
        assert_eq!(parse_semitones("3", -6, 6).unwrap(), 3);
        assert_eq!(parse_semitones(" -6 ", -6, 6).unwrap(), -6);
        assert_eq!(parse_semitones("2.0", -6, 6).unwrap(), 2);
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        for raw in ["", "abc", "1.5", "NaN", "inf", "7", "-7", "1e10"] {
            let err = parse_semitones(raw, -6, 6).unwrap_err();
            assert!(matches!(err, CoreError::InvalidSemitones(_)), "{raw:?}");
        }
    }
}
