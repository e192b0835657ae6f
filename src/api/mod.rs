//! Backend contracts consumed by the tracker.
//!
//! The tracker never talks HTTP directly: it goes through [`StreamApi`], which
//! [`HttpStreamApi`] implements with `reqwest`. Tests substitute their own
//! implementation and drive the live channel by hand through [`ChannelSender`].

pub mod http;
pub mod sse;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{INVALID_REQUEST_MESSAGE, TrackerError};

pub use http::HttpStreamApi;
pub use sse::{ChannelEvent, ChannelSender, LiveChannel, ReadyState, SseDecoder, SseFrame};

/// Delivery platform of a monitored stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Chaturbate,
    Stripchat,
}

impl Platform {
    /// Guess the platform from a room URL, using `fallback` when the URL does
    /// not name a known domain.
    pub fn infer(room_url: &str, fallback: Platform) -> Platform {
        if room_url.to_lowercase().contains("stripchat.com") {
            Platform::Stripchat
        } else {
            fallback
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Chaturbate => write!(f, "chaturbate"),
            Platform::Stripchat => write!(f, "stripchat"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chaturbate" => Ok(Platform::Chaturbate),
            "stripchat" => Ok(Platform::Stripchat),
            _ => anyhow::bail!(
                "Invalid platform '{}'. Valid values: chaturbate, stripchat",
                s
            ),
        }
    }
}

/// Payload for the "create stream" request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateStreamRequest {
    #[serde(default)]
    pub room_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<i64>,
}

impl CreateStreamRequest {
    pub fn new(room_url: impl Into<String>) -> Self {
        Self {
            room_url: Some(room_url.into()),
            ..Self::default()
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_agent(mut self, agent_id: i64) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// Check the request locally and fill in the platform.
    ///
    /// Fails without touching the network when the room URL is missing or blank.
    pub fn normalize(mut self, default_platform: Platform) -> Result<Self, TrackerError> {
        let room_url = match self.room_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => return Err(TrackerError::Validation(INVALID_REQUEST_MESSAGE.to_string())),
        };
        if self.platform.is_none() {
            self.platform = Some(Platform::infer(&room_url, default_platform));
        }
        self.room_url = Some(room_url);
        Ok(self)
    }
}

/// Result of the creation request.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateJobResponse {
    /// The backend accepted the job and will report progress for `job_id`.
    Queued {
        job_id: String,
        monitor_url: Option<String>,
    },
    /// The backend created the stream synchronously.
    Completed { stream: Option<serde_json::Value> },
}

/// Progress payload shared by the live channel and the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub estimated_time: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub stream_data: Option<serde_json::Value>,
}

impl JobProgress {
    pub fn is_complete(&self) -> bool {
        self.progress >= 100
    }

    /// Error reported by the backend, ignoring empty strings.
    pub fn job_error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

/// The backend operations the tracker depends on.
#[async_trait]
pub trait StreamApi: Send + Sync {
    /// Submit a creation request.
    async fn create_job(
        &self,
        request: &CreateStreamRequest,
    ) -> Result<CreateJobResponse, TrackerError>;

    /// Fetch the current status of a job.
    async fn job_status(&self, job_id: &str) -> Result<JobProgress, TrackerError>;

    /// Open the live update channel for a job.
    ///
    /// Never fails up front; connection problems arrive as channel events.
    fn open_channel(&self, job_id: &str) -> LiveChannel;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_stripchat_from_url() {
        assert_eq!(
            Platform::infer("https://stripchat.com/abc", Platform::Chaturbate),
            Platform::Stripchat
        );
        assert_eq!(
            Platform::infer("HTTPS://WWW.STRIPCHAT.COM/abc", Platform::Chaturbate),
            Platform::Stripchat
        );
    }

    #[test]
    fn unknown_domain_uses_fallback() {
        assert_eq!(
            Platform::infer("https://example.com/abc", Platform::Chaturbate),
            Platform::Chaturbate
        );
        assert_eq!(
            Platform::infer("https://example.com/abc", Platform::Stripchat),
            Platform::Stripchat
        );
    }

    #[test]
    fn platform_parses_case_insensitively() {
        assert_eq!("Stripchat".parse::<Platform>().unwrap(), Platform::Stripchat);
        assert_eq!(" chaturbate ".parse::<Platform>().unwrap(), Platform::Chaturbate);
        assert!("youtube".parse::<Platform>().is_err());
    }

    #[test]
    fn normalize_rejects_missing_and_blank_urls() {
        let missing = CreateStreamRequest::default().normalize(Platform::Chaturbate);
        assert!(matches!(missing, Err(TrackerError::Validation(_))));

        let blank = CreateStreamRequest::new("   ").normalize(Platform::Chaturbate);
        assert!(matches!(blank, Err(TrackerError::Validation(_))));
    }

    #[test]
    fn normalize_keeps_explicit_platform() {
        let req = CreateStreamRequest::new("https://stripchat.com/abc")
            .with_platform(Platform::Chaturbate)
            .normalize(Platform::Chaturbate)
            .unwrap();
        assert_eq!(req.platform, Some(Platform::Chaturbate));
    }

    #[test]
    fn normalize_trims_and_infers() {
        let req = CreateStreamRequest::new("  https://stripchat.com/abc ")
            .with_agent(7)
            .normalize(Platform::Chaturbate)
            .unwrap();
        assert_eq!(req.room_url.as_deref(), Some("https://stripchat.com/abc"));
        assert_eq!(req.platform, Some(Platform::Stripchat));

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["platform"], "stripchat");
        assert_eq!(json["agent_id"], 7);
    }

    #[test]
    fn progress_payload_tolerates_nulls() {
        let json = r#"{"progress": 40, "message": "Scraping", "error": null, "estimated_time": null}"#;
        let p: JobProgress = serde_json::from_str(json).unwrap();
        assert_eq!(p.progress, 40);
        assert_eq!(p.message.as_deref(), Some("Scraping"));
        assert!(p.job_error().is_none());
        assert!(!p.is_complete());
    }

    #[test]
    fn empty_error_string_is_not_a_job_error() {
        let p = JobProgress {
            progress: 100,
            error: Some(String::new()),
            ..JobProgress::default()
        };
        assert!(p.is_complete());
        assert!(p.job_error().is_none());
    }
}
