use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{DispatchFailure, DispatchSignal, JobDispatcher};

/// POSTs each signal as JSON to the image worker's trigger endpoint.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: Client,
    trigger_url: String,
    token: Option<String>,
}

impl HttpDispatcher {
    pub fn new(
        trigger_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DispatchFailure> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchFailure::Other(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            trigger_url: trigger_url.into(),
            token,
        })
    }
}

#[async_trait]
impl JobDispatcher for HttpDispatcher {
    async fn notify_jobs_pending(&self, signal: &DispatchSignal) -> Result<(), DispatchFailure> {
        let mut req = self.client.post(&self.trigger_url).json(signal);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| DispatchFailure::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DispatchFailure::Rejected {
                status: resp.status().as_u16(),
            });
        }

        debug!(
            owner_id = %signal.owner_id,
            job_count = signal.job_count,
            "image worker signalled"
        );
        Ok(())
    }
}
