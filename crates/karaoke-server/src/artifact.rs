//! Streaming job artifacts back to the client
//!
//! The response body takes ownership of the job workspace. The tree is removed when hyper
//! drops the body: after the last chunk is sent, or as soon as the client goes away.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use futures_util::Stream;
use tokio_util::io::ReaderStream;

use karaoke_core::{Artifact, CoreError, Workspace};

use crate::error::ApiError;

/// How the body length is advertised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// `Content-Length` from the file size
    Sized,
    /// No length; hyper uses chunked encoding
    Chunked,
}

/// Keeps a workspace alive for as long as its file is being read
struct WorkspaceStream<S> {
    inner: S,
    _workspace: Workspace,
}

impl<S: Stream + Unpin> Stream for WorkspaceStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

pub async fn stream_artifact(artifact: Artifact, transfer: Transfer) -> Result<Response, ApiError> {
    let Artifact {
        path,
        content_type,
        file_name,
        workspace,
    } = artifact;

    let file = tokio::fs::File::open(&path).await.map_err(CoreError::from)?;
    let len = file.metadata().await.map_err(CoreError::from)?.len();
    tracing::info!(job_id = %workspace.id(), file = file_name, bytes = len, "streaming artifact");

    let body = Body::from_stream(WorkspaceStream {
        inner: ReaderStream::new(file),
        _workspace: workspace,
    });

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, format!("attachment; filename=\"{file_name}\""));
    if transfer == Transfer::Sized {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }

    builder
        .body(body)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to build response: {e}")))
}
