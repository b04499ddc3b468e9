//! Speech-to-text client
//!
//! The HTTP implementation posts the raw audio with its mime type and
//! expects `{"text": ..., "source": ..., "duration": ...}` back. Callers use
//! [`transcribe_or_empty`], which turns any failure into an empty
//! transcript so a qualification never aborts on transcription.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::TranscriptionConfig;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    /// Provider or model that produced the text
    #[serde(default)]
    pub source: Option<String>,
    /// Audio length in seconds, when reported
    #[serde(default)]
    pub duration: Option<f64>,
}

impl Transcript {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &'static str;

    async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> Result<Transcript>;
}

/// Transcribe, degrading every failure to an empty transcript
pub async fn transcribe_or_empty(
    transcriber: &dyn Transcriber,
    audio: Vec<u8>,
    mime_type: &str,
) -> Transcript {
    let bytes = audio.len();
    match transcriber.transcribe(audio, mime_type).await {
        Ok(transcript) => {
            debug!(
                provider = transcriber.name(),
                bytes,
                chars = transcript.text.len(),
                "Audio transcribed"
            );
            transcript
        }
        Err(e) => {
            warn!(
                provider = transcriber.name(),
                bytes,
                error = %e,
                "Transcription failed, continuing without transcript"
            );
            Transcript::default()
        }
    }
}

/// Used when no transcription endpoint is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTranscriber;

#[async_trait]
impl Transcriber for DisabledTranscriber {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn transcribe(&self, _audio: Vec<u8>, _mime_type: &str) -> Result<Transcript> {
        Err(Error::ExternalService(
            "no transcription endpoint configured".to_string(),
        ))
    }
}

pub struct HttpTranscriber {
    http_client: reqwest::Client,
    endpoint: reqwest::Url,
    api_key: Option<String>,
}

impl HttpTranscriber {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let endpoint = reqwest::Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("Invalid transcription endpoint: {}", e)))?;
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("qcrm/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint,
            api_key,
        })
    }

    /// Build the configured transcriber, or the disabled one without an endpoint
    pub fn from_config(config: &TranscriptionConfig) -> Result<Box<dyn Transcriber>> {
        match config.endpoint.as_deref() {
            Some(endpoint) => Ok(Box::new(Self::new(
                endpoint,
                config.api_key.clone(),
                crate::time::millis_to_duration(config.timeout_ms),
            )?)),
            None => Ok(Box::new(DisabledTranscriber)),
        }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> Result<Transcript> {
        let mut request = self
            .http_client
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(audio);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::ExternalService(format!("transcription request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ExternalService(format!(
                "transcription service returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        response
            .json::<Transcript>()
            .await
            .map_err(|e| Error::ExternalService(format!("unreadable transcription response: {}", e)))
    }
}
