//! Long-running image-to-video jobs.
//!
//! A job moves through `Submitting → Polling → Downloading → Ready`; any error
//! aborts it. The remote operation is never cancelled: dropping the result is
//! the only way to stop waiting on it.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use frameshift_contracts::requests::{GeneratedAsset, JobPhase, ProgressEvent, VideoRequest};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::codec::EncodedImage;
use crate::config::EngineConfig;
use crate::credentials::{Credential, CredentialSource};
use crate::error::{Result, StudioError};
use crate::transport::{redact_key, truncate_text, FetchedBody, GenerativeTransport};

pub const SUBMIT_MESSAGE: &str = "Starting video generation...";
pub const CREATED_MESSAGE: &str =
    "Operation created, generating the video. This can take a few minutes...";
pub const DOWNLOADING_MESSAGE: &str = "Video generated! Downloading...";
pub const READY_MESSAGE: &str = "Video ready!";

/// Shown while polling, cycling by poll count.
pub const POLL_MESSAGES: [&str; 5] = [
    "Warming up the model...",
    "Creating the first frames of the video...",
    "Calculating motion paths...",
    "Rendering video frames...",
    "Almost done, applying the final touches...",
];

pub const VIDEO_RESOLUTION: &str = "720p";
const VIDEO_SAMPLE_COUNT: u32 = 1;

pub fn poll_message(poll_count: u32) -> &'static str {
    POLL_MESSAGES[poll_count as usize % POLL_MESSAGES.len()]
}

/// Wait between status checks.
pub trait Pause: Send + Sync {
    fn pause(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Snapshot of a remote long-running operation. Refreshing yields a new handle.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobHandle {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub error: Option<OperationError>,
}

impl JobHandle {
    pub fn from_value(value: Value) -> Result<Self> {
        let handle: JobHandle = serde_json::from_value(value)
            .map_err(|err| StudioError::malformed(format!("invalid operation payload: {err}")))?;
        if handle.name.trim().is_empty() {
            return Err(StudioError::malformed("operation payload has no name"));
        }
        Ok(handle)
    }

    /// URI of the first generated video, in either the REST or SDK response shape.
    pub fn video_uri(&self) -> Option<&str> {
        let response = self.response.as_ref()?;
        response
            .get("generateVideoResponse")
            .and_then(|inner| inner.get("generatedSamples"))
            .and_then(first_sample_uri)
            .or_else(|| response.get("generatedVideos").and_then(first_sample_uri))
    }

    fn failure(&self) -> Option<StudioError> {
        self.error.as_ref().map(|error| StudioError::JobFailed {
            operation: self.name.clone(),
            message: if error.message.is_empty() {
                format!("error code {}", error.code)
            } else {
                error.message.clone()
            },
        })
    }
}

pub struct VideoJobOrchestrator {
    config: Arc<EngineConfig>,
    transport: Arc<dyn GenerativeTransport>,
    credentials: Arc<dyn CredentialSource>,
    pause: Arc<dyn Pause>,
}

impl VideoJobOrchestrator {
    pub fn new(
        config: Arc<EngineConfig>,
        transport: Arc<dyn GenerativeTransport>,
        credentials: Arc<dyn CredentialSource>,
        pause: Arc<dyn Pause>,
    ) -> Self {
        Self {
            config,
            transport,
            credentials,
            pause,
        }
    }

    /// Runs one job to completion, reporting progress through `on_progress`.
    pub fn animate_image(
        &self,
        request: &VideoRequest,
        on_progress: &mut dyn FnMut(&ProgressEvent),
    ) -> Result<GeneratedAsset> {
        let credential = self.credentials.resolve_credential()?;
        let mut phase = JobPhase::Submitting;
        let outcome = self.run(request, &credential, &mut phase, on_progress);
        if let Err(err) = &outcome {
            warn!(%phase, error = %err, "video job failed");
            on_progress(&ProgressEvent::new(JobPhase::Failed, err.to_string()));
        }
        outcome
    }

    fn run(
        &self,
        request: &VideoRequest,
        credential: &Credential,
        phase: &mut JobPhase,
        on_progress: &mut dyn FnMut(&ProgressEvent),
    ) -> Result<GeneratedAsset> {
        let mut report = |phase: JobPhase, message: &str| {
            on_progress(&ProgressEvent::new(phase, message));
        };

        report(JobPhase::Submitting, SUBMIT_MESSAGE);
        let handle = self.submit(request, credential)?;
        report(JobPhase::Submitting, CREATED_MESSAGE);

        *phase = JobPhase::Polling;
        info!(operation = %handle.name, "video operation submitted");
        let handle = self.poll_until_done(handle, credential, &mut report)?;

        *phase = JobPhase::Downloading;
        report(JobPhase::Downloading, DOWNLOADING_MESSAGE);
        let body = self.download(&handle)?;

        let asset = self.materialize(body)?;
        report(JobPhase::Ready, READY_MESSAGE);
        Ok(asset)
    }

    fn submit(&self, request: &VideoRequest, credential: &Credential) -> Result<JobHandle> {
        let endpoint = self
            .config
            .model_endpoint(&self.config.video_model, "predictLongRunning");
        let image = EncodedImage::new(request.image_bytes.clone(), request.mime_type.clone());
        let payload = json!({
            "instances": [{
                "prompt": request.instruction,
                "image": image.prediction_image(),
            }],
            "parameters": {
                "sampleCount": VIDEO_SAMPLE_COUNT,
                "resolution": VIDEO_RESOLUTION,
                "aspectRatio": request.aspect_ratio.as_str(),
            },
        });
        let response = self
            .transport
            .post_json("Veo", &endpoint, credential, &payload)?;
        JobHandle::from_value(response)
    }

    fn poll_until_done(
        &self,
        mut handle: JobHandle,
        credential: &Credential,
        report: &mut dyn FnMut(JobPhase, &str),
    ) -> Result<JobHandle> {
        let mut poll_count: u32 = 0;
        loop {
            if let Some(err) = handle.failure() {
                return Err(err);
            }
            if handle.done {
                info!(operation = %handle.name, polls = poll_count, "video operation finished");
                return Ok(handle);
            }
            if let Some(limit) = self.config.max_polls {
                if poll_count >= limit {
                    return Err(StudioError::PollLimitExceeded {
                        operation: handle.name,
                        polls: poll_count,
                    });
                }
            }

            report(JobPhase::Polling, poll_message(poll_count));
            poll_count += 1;
            self.pause.pause(self.config.poll_interval);

            let status_url = self.config.operation_endpoint(&handle.name);
            debug!(operation = %handle.name, poll = poll_count, "refreshing operation");
            let refreshed = self.transport.get_json("Veo", &status_url, credential)?;
            handle = JobHandle::from_value(refreshed)?;
        }
    }

    fn download(&self, handle: &JobHandle) -> Result<FetchedBody> {
        let uri = handle.video_uri().ok_or(StudioError::NoVideoLink)?;
        let credential = self.credentials.resolve_credential()?;
        let url = with_key_param(uri, &credential)?;

        let body = self.transport.fetch(&url)?;
        if !body.is_success() {
            warn!(
                status = body.status,
                url = %redact_key(&url),
                body = %truncate_text(&String::from_utf8_lossy(&body.bytes), 512),
                "video download failed"
            );
            let status = if body.status_text.trim().is_empty() {
                body.status.to_string()
            } else {
                body.status_text
            };
            return Err(StudioError::Download { status });
        }
        Ok(body)
    }

    fn materialize(&self, body: FetchedBody) -> Result<GeneratedAsset> {
        let dir = &self.config.output_dir;
        fs::create_dir_all(dir).map_err(|source| StudioError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.clone());
        let ext = video_extension(body.content_type.as_deref());
        let mut file = tempfile::Builder::new()
            .prefix("video-")
            .suffix(&format!(".{ext}"))
            .tempfile_in(&dir)
            .map_err(|source| StudioError::Io {
                path: dir.display().to_string(),
                source,
            })?;
        file.write_all(&body.bytes).map_err(|source| StudioError::Io {
            path: file.path().display().to_string(),
            source,
        })?;
        let path = file.into_temp_path();
        info!(path = %path.display(), bytes = body.bytes.len(), "video ready");
        Ok(GeneratedAsset::Video {
            local_uri: file_uri(&path),
            path,
        })
    }
}

/// Appends the credential as the `key` query parameter, keeping existing ones.
pub fn with_key_param(uri: &str, credential: &Credential) -> Result<String> {
    let mut url = Url::parse(uri)
        .map_err(|err| StudioError::malformed(format!("invalid video link '{uri}': {err}")))?;
    url.query_pairs_mut().append_pair("key", credential.expose());
    Ok(url.to_string())
}

fn first_sample_uri(samples: &Value) -> Option<&str> {
    samples
        .get(0)?
        .get("video")?
        .get("uri")?
        .as_str()
        .map(str::trim)
        .filter(|uri| !uri.is_empty())
}

fn video_extension(content_type: Option<&str>) -> &'static str {
    let lowered = content_type.unwrap_or_default().to_ascii_lowercase();
    if lowered.contains("webm") {
        return "webm";
    }
    if lowered.contains("quicktime") {
        return "mov";
    }
    "mp4"
}

fn file_uri(path: &Path) -> String {
    Url::from_file_path(path)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| format!("file://{}", path.display()))
}
