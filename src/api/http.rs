use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::sse::{ChannelSender, LiveChannel, SseDecoder};
use super::{CreateJobResponse, CreateStreamRequest, JobProgress, StreamApi};
use crate::errors::TrackerError;

const INTERACTIVE_CREATE_PATH: &str = "/api/streams/interactive";
const LEGACY_CREATE_PATH: &str = "/api/streams";
const STATUS_PATH: &str = "/api/streams/interactive/status";
const SSE_PATH: &str = "/api/streams/interactive/sse";

/// [`StreamApi`] over the dashboard backend's HTTP endpoints.
pub struct HttpStreamApi {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpStreamApi {
    /// Build a client for `base_url` (e.g. `http://localhost:5000`).
    ///
    /// `request_timeout` bounds one-shot requests only; the event stream stays
    /// open as long as the server keeps it open.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .user_agent(concat!("streamwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Older backends without job tracking create the stream in one call.
    async fn create_legacy(
        &self,
        request: &CreateStreamRequest,
    ) -> Result<CreateJobResponse, TrackerError> {
        debug!("Backend returned no job id, using legacy creation endpoint");
        let resp = self
            .client
            .post(self.endpoint(LEGACY_CREATE_PATH))
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(error_from_response(resp).await);
        }
        if status != StatusCode::CREATED {
            return Err(TrackerError::Http {
                status: status.as_u16(),
                message: None,
            });
        }
        Ok(CreateJobResponse::Completed {
            stream: read_json(resp).await,
        })
    }
}

#[async_trait]
impl StreamApi for HttpStreamApi {
    async fn create_job(
        &self,
        request: &CreateStreamRequest,
    ) -> Result<CreateJobResponse, TrackerError> {
        let resp = self
            .client
            .post(self.endpoint(INTERACTIVE_CREATE_PATH))
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(error_from_response(resp).await);
        }

        let body = read_json(resp).await;
        let job_id = body
            .as_ref()
            .and_then(|b| b.get("job_id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty());

        if let Some(job_id) = job_id {
            let monitor_url = body
                .as_ref()
                .and_then(|b| b.get("monitor_url"))
                .and_then(Value::as_str)
                .map(str::to_string);
            return Ok(CreateJobResponse::Queued {
                job_id: job_id.to_string(),
                monitor_url,
            });
        }

        if status == StatusCode::CREATED {
            return Ok(CreateJobResponse::Completed { stream: body });
        }

        self.create_legacy(request).await
    }

    async fn job_status(&self, job_id: &str) -> Result<JobProgress, TrackerError> {
        let resp = self
            .client
            .get(self.endpoint(STATUS_PATH))
            .timeout(self.request_timeout)
            .query(&[("job_id", job_id)])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        Ok(resp.json::<JobProgress>().await?)
    }

    fn open_channel(&self, job_id: &str) -> LiveChannel {
        let request = self
            .client
            .get(self.endpoint(SSE_PATH))
            .query(&[("job_id", job_id)])
            .header(ACCEPT, "text/event-stream");
        let (sender, channel) = LiveChannel::pair();
        let reader = tokio::spawn(read_events(request, sender));
        channel.attach(reader)
    }
}

/// Pump the event stream into the channel until the server or the tracker
/// ends it.
async fn read_events(request: RequestBuilder, sender: ChannelSender) {
    let response = match request.send().await {
        Ok(resp) if resp.status().is_success() => resp,
        Ok(resp) => {
            warn!(status = %resp.status(), "Event stream rejected");
            sender.fail();
            return;
        }
        Err(e) => {
            warn!(error = %e, "Event stream connection failed");
            sender.fail();
            return;
        }
    };

    sender.open();
    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Event stream interrupted");
                break;
            }
        };
        for frame in decoder.feed(&bytes) {
            if !frame.is_message() {
                debug!(event = %frame.event, "Ignoring named event");
                continue;
            }
            if !sender.message(frame.data) {
                // Tracker closed the channel.
                return;
            }
        }
    }

    sender.fail();
}

async fn read_json(resp: Response) -> Option<Value> {
    let bytes = resp.bytes().await.ok()?;
    serde_json::from_slice::<Value>(&bytes)
        .ok()
        .filter(|v| !v.is_null())
}

async fn error_from_response(resp: Response) -> TrackerError {
    let status = resp.status().as_u16();
    let message = read_json(resp)
        .await
        .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string));
    TrackerError::Http { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_strips_trailing_slash() {
        let api = HttpStreamApi::new("http://localhost:5000/", Duration::from_secs(5)).unwrap();
        assert_eq!(api.base_url(), "http://localhost:5000");
        assert_eq!(
            api.endpoint(STATUS_PATH),
            "http://localhost:5000/api/streams/interactive/status"
        );
    }
}
