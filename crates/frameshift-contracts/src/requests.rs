//! Request, progress and asset types shared by the engine and its callers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tempfile::TempPath;

/// Output framing for generated videos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 2] = [AspectRatio::Landscape, AspectRatio::Portrait];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "16:9" | "landscape" | "wide" => Ok(AspectRatio::Landscape),
            "9:16" | "portrait" | "tall" => Ok(AspectRatio::Portrait),
            other => Err(format!(
                "unsupported aspect ratio '{other}' (expected 16:9 or 9:16)"
            )),
        }
    }
}

/// One image edit submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub image_bytes: Vec<u8>,
    pub mime_type: String,
    pub instruction: String,
}

impl GenerationRequest {
    pub fn new(
        image_bytes: Vec<u8>,
        mime_type: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            image_bytes,
            mime_type: mime_type.into(),
            instruction: instruction.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextSuggestionRequest {
    pub instruction: String,
    pub topic: Option<String>,
}

impl TextSuggestionRequest {
    pub fn new(instruction: impl Into<String>, topic: Option<String>) -> Self {
        Self {
            instruction: instruction.into(),
            topic,
        }
    }

    /// Topic with surrounding whitespace removed, or `None` when blank.
    pub fn topic(&self) -> Option<&str> {
        self.topic
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRequest {
    pub image_bytes: Vec<u8>,
    pub mime_type: String,
    pub instruction: String,
    pub aspect_ratio: AspectRatio,
}

impl VideoRequest {
    pub fn new(
        image_bytes: Vec<u8>,
        mime_type: impl Into<String>,
        instruction: impl Into<String>,
        aspect_ratio: AspectRatio,
    ) -> Self {
        Self {
            image_bytes,
            mime_type: mime_type.into(),
            instruction: instruction.into(),
            aspect_ratio,
        }
    }
}

/// Where a video job was when a progress message was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Submitting,
    Polling,
    Downloading,
    Ready,
    Failed,
}

impl JobPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            JobPhase::Submitting => "submitting",
            JobPhase::Polling => "polling",
            JobPhase::Downloading => "downloading",
            JobPhase::Ready => "ready",
            JobPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: JobPhase,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(phase: JobPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub enum GeneratedAsset {
    Image {
        bytes: Vec<u8>,
        mime_type: Option<String>,
    },
    /// Downloaded video in the session directory. The file is removed when the
    /// asset is dropped unless `path` is persisted first.
    Video { local_uri: String, path: TempPath },
}
