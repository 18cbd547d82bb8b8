#![doc = "Uploader implementations for the CLI: an HTTP client for the series ingest endpoint and a dry-run client that only logs."]
//
//! # Uploader Integration (CLI <-> Core)
//!
//! Both types implement [`SeriesUploader`] from `dicom-ingest-core`. The
//! core decides when each phase runs and how many transfers are in flight;
//! these clients only translate one call into one request.
//!
//! ## Wire shape
//!
//! - `POST {base}/series` with the [`NewSeriesUpload`] JSON body, answered by
//!   `{"session_token": "..."}`.
//! - `PUT {base}/series/{token}/files/{file_name}` with the redacted bytes
//!   and an `X-Content-SHA256` header. The token and file name are each
//!   sent as one percent-encoded path segment.
//! - `POST {base}/series/{token}/end` with the [`SeriesSummary`] JSON body.
//!
//! Any non-2xx status is reported as a failure of that call.

use async_trait::async_trait;
use dicom_ingest_core::contract::{NewSeriesUpload, SeriesSummary, SeriesUploader, SessionToken};
use dicom_ingest_core::error::TransferError;
use reqwest::Url;
use serde::Deserialize;
use sha2::{Digest, Sha256};

pub const CONTENT_HASH_HEADER: &str = "X-Content-SHA256";

#[derive(Debug, Deserialize)]
struct StartResponse {
    session_token: String,
}

pub struct HttpUploader {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUploader {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        tracing::info!(base_url = %base_url, "Initialized HttpUploader");
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Appends `segments` to the base path, encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url, TransferError> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|()| -> TransferError {
                format!("endpoint {} cannot carry a path", self.base_url).into()
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, TransferError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(format!("HTTP {status}: {body}").into())
}

#[async_trait]
impl SeriesUploader for HttpUploader {
    async fn start_series(&self, req: NewSeriesUpload) -> Result<SessionToken, TransferError> {
        tracing::info!(
            series_key = %req.series_key,
            files = req.files_total,
            "Starting series upload"
        );
        let response = self
            .client
            .post(self.url(&["series"])?)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, series_key = %req.series_key, "Start request failed");
                e
            })?;
        let started: StartResponse = check(response).await?.json().await?;
        tracing::info!(token = %started.session_token, "Series session opened");
        Ok(SessionToken(started.session_token))
    }

    async fn transfer_file(
        &self,
        session: &SessionToken,
        file_name: &str,
        content: &[u8],
    ) -> Result<(), TransferError> {
        let hash = content_hash(content);
        tracing::debug!(file_name, bytes = content.len(), hash = %hash, "Transferring file");
        let response = self
            .client
            .put(self.url(&["series", &session.0, "files", file_name])?)
            .header(CONTENT_HASH_HEADER, hash)
            .body(content.to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, file_name, "Transfer request failed");
                e
            })?;
        check(response).await?;
        Ok(())
    }

    async fn end_series(
        &self,
        session: &SessionToken,
        summary: SeriesSummary,
    ) -> Result<(), TransferError> {
        tracing::info!(
            token = %session.0,
            uploaded = summary.files_uploaded,
            failed = summary.files_failed,
            "Ending series upload"
        );
        let response = self
            .client
            .post(self.url(&["series", &session.0, "end"])?)
            .json(&summary)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, token = %session.0, "End request failed");
                e
            })?;
        check(response).await?;
        Ok(())
    }
}

/// Accepts every call and logs what would have been sent.
#[derive(Debug, Default)]
pub struct DryRunUploader;

#[async_trait]
impl SeriesUploader for DryRunUploader {
    async fn start_series(&self, req: NewSeriesUpload) -> Result<SessionToken, TransferError> {
        let token = SessionToken(format!("dry-run-{}", uuid::Uuid::new_v4()));
        match serde_json::to_string_pretty(&req) {
            Ok(json) => tracing::info!(token = %token.0, request = %json, "[DRY RUN] start_series"),
            Err(e) => tracing::warn!(error = %e, "[DRY RUN] Could not serialise start request"),
        }
        Ok(token)
    }

    async fn transfer_file(
        &self,
        session: &SessionToken,
        file_name: &str,
        content: &[u8],
    ) -> Result<(), TransferError> {
        tracing::info!(
            token = %session.0,
            file_name,
            bytes = content.len(),
            hash = %content_hash(content),
            "[DRY RUN] transfer_file"
        );
        Ok(())
    }

    async fn end_series(
        &self,
        session: &SessionToken,
        summary: SeriesSummary,
    ) -> Result<(), TransferError> {
        tracing::info!(
            token = %session.0,
            uploaded = summary.files_uploaded,
            failed = summary.files_failed,
            total = summary.files_total,
            "[DRY RUN] end_series"
        );
        Ok(())
    }
}
