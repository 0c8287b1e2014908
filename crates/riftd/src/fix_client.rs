//! Fix producers available to the daemon.

use async_trait::async_trait;
use reqwest::StatusCode;
use rift_core::collaborators::{FixProducer, FixRequest, ProposedFix};
use rift_core::domain::{Result, RiftError};
use tracing::{debug, info};

/// Fix producer reached over HTTP.
///
/// The [`FixRequest`] is POSTed as JSON. `200` carries a [`ProposedFix`],
/// `204` means nothing to propose; any other status is an error.
#[derive(Debug, Clone)]
pub struct HttpFixProducer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpFixProducer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl FixProducer for HttpFixProducer {
    async fn propose(&self, request: &FixRequest) -> Result<Option<ProposedFix>> {
        debug!(
            endpoint = %self.endpoint,
            session_id = %request.session_id,
            iteration = request.iteration,
            errors = request.errors.len(),
            "requesting fix"
        );
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| RiftError::FixProducer(format!("request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RiftError::FixProducer(format!(
                "fix endpoint returned {status}: {}",
                body.trim()
            )));
        }

        let fix: ProposedFix = response
            .json()
            .await
            .map_err(|e| RiftError::FixProducer(format!("invalid fix response: {e}")))?;
        info!(session_id = %request.session_id, file = %fix.file_path, "fix proposed");
        Ok(Some(fix))
    }
}

/// Fix producer used when no endpoint is configured: never proposes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFixProducer;

#[async_trait]
impl FixProducer for NoFixProducer {
    async fn propose(&self, _request: &FixRequest) -> Result<Option<ProposedFix>> {
        Ok(None)
    }
}
