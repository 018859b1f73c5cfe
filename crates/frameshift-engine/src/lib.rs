//! Orchestration layer for image edits, caption suggestions and image-to-video jobs
//! against the Gemini / Veo REST API.

pub mod client;
pub mod codec;
pub mod config;
pub mod credentials;
pub mod error;
pub mod transport;
pub mod video;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use frameshift_contracts::events::{EventPayload, EventWriter};
use frameshift_contracts::requests::{
    GeneratedAsset, GenerationRequest, ProgressEvent, TextSuggestionRequest, VideoRequest,
};
use serde_json::Value;
use tracing::warn;

pub use client::{compose_edit_instruction, GenerationClient, EXAMPLE_EDIT_INSTRUCTIONS};
pub use codec::{encode_binary_for_transfer, EncodedImage};
pub use config::EngineConfig;
pub use credentials::{
    key_selection_ready, request_key_selection, resolve_credential, Credential,
    CredentialSource, EnvCredentials, HostKeyProbe, ProbeFallback, StaticCredentials,
};
pub use error::{Result, StudioError};
pub use transport::{GenerativeTransport, HttpTransport};
pub use video::{JobHandle, Pause, ThreadPause, VideoJobOrchestrator};

/// Caller-facing entry point. Every call builds its own client, so the
/// credential is looked up again each time.
pub struct Studio {
    config: Arc<EngineConfig>,
    transport: Arc<dyn GenerativeTransport>,
    credentials: Arc<dyn CredentialSource>,
    pause: Arc<dyn Pause>,
    events: Option<EventWriter>,
}

impl Studio {
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn GenerativeTransport>,
        credentials: Arc<dyn CredentialSource>,
        pause: Arc<dyn Pause>,
    ) -> Self {
        for warning in &config.warnings {
            warn!("{warning}");
        }
        Self {
            config: Arc::new(config),
            transport,
            credentials,
            pause,
            events: None,
        }
    }

    pub fn from_env() -> Self {
        let config = EngineConfig::from_env();
        let transport = Arc::new(HttpTransport::new(config.request_timeout));
        Self::new(config, transport, Arc::new(EnvCredentials), Arc::new(ThreadPause))
    }

    /// Mirrors video job progress into a JSONL event log.
    pub fn with_event_log(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn client(&self) -> Result<GenerationClient> {
        GenerationClient::new(
            self.config.clone(),
            self.transport.clone(),
            self.credentials.as_ref(),
        )
    }

    pub fn edit_image(
        &self,
        image_bytes: Vec<u8>,
        mime_type: &str,
        instruction: &str,
    ) -> Result<GeneratedAsset> {
        let request = GenerationRequest::new(image_bytes, mime_type, instruction);
        self.client()?.edit_image(&request)
    }

    pub fn generate_text_suggestion(&self, instruction: &str, topic: Option<&str>) -> Result<String> {
        let request = TextSuggestionRequest::new(instruction, topic.map(str::to_string));
        self.client()?.generate_text_suggestion(&request)
    }

    pub fn animate_image(
        &self,
        request: &VideoRequest,
        on_progress: &mut dyn FnMut(&ProgressEvent),
    ) -> Result<GeneratedAsset> {
        let orchestrator = VideoJobOrchestrator::new(
            self.config.clone(),
            self.transport.clone(),
            self.credentials.clone(),
            self.pause.clone(),
        );
        let Some(events) = self.events.clone() else {
            return orchestrator.animate_image(request, on_progress);
        };

        log_event(
            &events,
            "job_started",
            payload(&[
                ("model", Value::String(self.config.video_model.clone())),
                (
                    "aspect_ratio",
                    Value::String(request.aspect_ratio.as_str().to_string()),
                ),
            ]),
        );
        let outcome = orchestrator.animate_image(request, &mut |progress| {
            if let Err(err) = events.emit_progress(progress) {
                warn!(error = %err, "failed writing progress event");
            }
            on_progress(progress);
        });
        match &outcome {
            Ok(GeneratedAsset::Video { local_uri, .. }) => log_event(
                &events,
                "job_completed",
                payload(&[("local_uri", Value::String(local_uri.clone()))]),
            ),
            Ok(GeneratedAsset::Image { .. }) => {}
            Err(err) => log_event(
                &events,
                "job_failed",
                payload(&[
                    ("error", Value::String(err.to_string())),
                    (
                        "requires_key_reselection",
                        Value::Bool(err.requires_key_reselection()),
                    ),
                ]),
            ),
        }
        outcome
    }
}

fn payload(entries: &[(&str, Value)]) -> EventPayload {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn log_event(events: &EventWriter, event_type: &str, payload: EventPayload) {
    if let Err(err) = events.emit(event_type, payload) {
        warn!(event_type, error = %err, "failed writing job event");
    }
}
