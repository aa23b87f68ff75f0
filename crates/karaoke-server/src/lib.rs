//! Karaokeify HTTP service
//!
//! Thin axum layer over [`karaoke_core::Pipeline`]: multipart intake into the job workspace,
//! error bodies, and artifact streaming that keeps the workspace alive until the last byte.

pub mod artifact;
pub mod error;
pub mod logging;
pub mod server;
pub mod upload;

pub use error::ApiError;
pub use server::{build_router, run_server, AppState};
