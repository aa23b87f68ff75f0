//! Multipart intake
//!
//! The file field is streamed straight into the job workspace as `input.<ext>`. Text fields are
//! collected by name. The client's file name only contributes a sanitized extension.

use std::collections::HashMap;
use std::path::PathBuf;

use axum::extract::Multipart;
use tokio::io::AsyncWriteExt;

use karaoke_core::{upload_extension, CoreError, Workspace};

use crate::error::ApiError;

#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<PathBuf>,
    pub file_bytes: u64,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn require_file(&self, field: &str) -> Result<PathBuf, ApiError> {
        match &self.file {
            Some(path) if self.file_bytes > 0 => Ok(path.clone()),
            Some(_) => Err(ApiError::bad_request(format!("Uploaded `{field}` file is empty"))),
            None => Err(ApiError::bad_request(format!("Missing `{field}` file"))),
        }
    }
}

pub async fn read_upload(mut multipart: Multipart, ws: &Workspace, file_field: &str) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name != file_field {
            let value = field.text().await?;
            form.fields.insert(name, value);
            continue;
        }

        if form.file.is_some() {
            return Err(ApiError::bad_request(format!("More than one `{file_field}` file")));
        }

        let path = ws.file(&format!("input.{}", upload_extension(field.file_name())));
        let mut out = tokio::fs::File::create(&path).await.map_err(CoreError::from)?;
        let mut written = 0u64;
        while let Some(chunk) = field.chunk().await? {
            out.write_all(&chunk).await.map_err(CoreError::from)?;
            written += chunk.len() as u64;
        }
        out.flush().await.map_err(CoreError::from)?;

        tracing::debug!(job_id = %ws.id(), file = %path.display(), bytes = written, "upload stored");
        form.file = Some(path);
        form.file_bytes = written;
    }

    Ok(form)
}
