//! HTTP client for the version manager API
//!
//! Used by tooling and tests to preview admission and follow a deployment's
//! progress stream. The progress stream reconnects on transport drops.

use std::pin::Pin;

use anyhow::{Context, Result};
use futures::{future, stream, Stream, StreamExt};
use reqwest::header::ACCEPT;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::models::{AdmissionDecision, Identifier, Mode, PhaseEvent};
use crate::reconnect::{reconnecting, BackoffPolicy};

pub type PhaseEventStream = Pin<Box<dyn Stream<Item = PhaseEvent> + Send>>;

#[derive(Debug, Clone)]
pub struct VersionManagerClient {
    client: reqwest::Client,
    base_url: String,
}

impl VersionManagerClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "{} failed", what);
        anyhow::bail!("{} failed: {} - {}", what, status, body)
    }

    /// Ask the service whether a deployment of `mode` fits right now
    pub async fn check_admission(&self, mode: Mode) -> Result<AdmissionDecision> {
        let response = self
            .client
            .post(self.url("/api/cluster/admission"))
            .json(&json!({ "mode": mode }))
            .send()
            .await?;

        let response = Self::check_status(response, "Admission check").await?;
        Ok(response.json().await?)
    }

    /// Preview the namespace and port for a version or custom name
    pub async fn identifier(&self, version: Option<&str>, name: Option<&str>) -> Result<Identifier> {
        let mut query = Vec::new();
        if let Some(version) = version {
            query.push(("version", version));
        }
        if let Some(name) = name {
            query.push(("name", name));
        }

        let response = self
            .client
            .get(self.url("/api/identifier"))
            .query(&query)
            .send()
            .await?;

        let response = Self::check_status(response, "Identifier lookup").await?;
        Ok(response.json().await?)
    }

    /// Open one progress stream. Ends when the server closes it.
    pub async fn subscribe(&self, namespace: &str, mode: Option<Mode>) -> Result<PhaseEventStream> {
        let mut request = self
            .client
            .get(self.url(&format!("/api/versions/{}/events/stream", namespace)))
            .header(ACCEPT, "text/event-stream");
        if let Some(mode) = mode {
            request = request.query(&[("mode", mode.to_string())]);
        }

        let response = Self::check_status(request.send().await?, "Progress subscription").await?;
        debug!(namespace, "Subscribed to progress stream");

        let events = response
            .bytes_stream()
            .scan(SseDecoder::default(), |decoder, chunk| {
                let frames = match chunk {
                    Ok(bytes) => decoder.push(&bytes),
                    Err(e) => {
                        warn!(error = %e, "Progress stream interrupted");
                        return future::ready(None);
                    }
                };
                future::ready(Some(stream::iter(frames)))
            })
            .flatten()
            .filter_map(|frame| future::ready(frame.phase_event()));

        Ok(Box::pin(events))
    }

    /// Follow a deployment to its terminal phase, reconnecting as needed
    pub fn watch(&self, namespace: &str, mode: Option<Mode>, policy: BackoffPolicy) -> impl Stream<Item = PhaseEvent> {
        let client = self.clone();
        let namespace = namespace.to_string();
        reconnecting(
            move || {
                let client = client.clone();
                let namespace = namespace.clone();
                async move { client.subscribe(&namespace, mode).await }
            },
            policy,
        )
    }
}

/// One server-sent event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// Phase payload of a `phase` event
    fn phase_event(self) -> Option<PhaseEvent> {
        if self.event.as_deref() != Some("phase") {
            return None;
        }
        match serde_json::from_str(&self.data) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "Skipping malformed phase event");
                None
            }
        }
    }
}

/// Incremental `text/event-stream` decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes; returns every frame completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend(bytes.iter().filter(|b| **b != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(frame) = parse_block(&String::from_utf8_lossy(&block)) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn parse_block(block: &str) -> Option<SseFrame> {
    let mut frame = SseFrame::default();
    let mut data_lines = Vec::new();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => frame.event = Some(value.to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if frame.event.is_none() && data_lines.is_empty() {
        return None;
    }
    frame.data = data_lines.join("\n");
    Some(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeploymentPhase;

    #[test]
    fn test_decoder_handles_split_frames() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"event: phase\ndata: {\"pha").is_empty());

        let frames = decoder.push(b"se\":\"running\"}\n\n: keep-alive\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("phase"));
        assert_eq!(frames[0].data, "{\"phase\":\"running\"}");
    }

    #[test]
    fn test_decoder_normalizes_crlf_and_multiline_data() {
        let mut decoder = SseDecoder::default();
        let frames = decoder.push(b"event: note\r\ndata: a\r\ndata: b\r\n\r\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: Some("note".to_string()),
                data: "a\nb".to_string(),
            }]
        );
    }

    #[test]
    fn test_only_phase_frames_become_events() {
        let connected = SseFrame {
            event: Some("connected".to_string()),
            data: "{}".to_string(),
        };
        assert!(connected.phase_event().is_none());

        let phase = SseFrame {
            event: Some("phase".to_string()),
            data: r#"{"phase":"n8n-starting","label":"n8n starting","podsReady":1,"podsTotal":2}"#
                .to_string(),
        };
        let event = phase.phase_event().unwrap();
        assert_eq!(event.phase, DeploymentPhase::N8nStarting);
        assert_eq!(event.pods_ready, 1);
    }
}
