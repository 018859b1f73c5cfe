//! Engine settings read from the process environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use frameshift_contracts::models::{Capability, ModelSelector};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 120.0;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub api_base: String,
    pub image_model: String,
    pub text_model: String,
    pub video_model: String,
    pub poll_interval: Duration,
    /// `None` polls until the operation reports `done`.
    pub max_polls: Option<u32>,
    pub request_timeout: Duration,
    pub output_dir: PathBuf,
    /// Notes about overrides that were ignored or clamped.
    pub warnings: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut warnings = Vec::new();
        let selector = ModelSelector::new(None);
        let mut model_for = |key: &str, capability: Capability| {
            let requested = lookup(key);
            match selector.select(requested.as_deref(), capability) {
                Ok(selection) => {
                    if requested.is_some() {
                        if let Some(reason) = selection.fallback_reason {
                            push_unique_warning(&mut warnings, reason);
                        }
                    }
                    selection.model.name
                }
                // The built-in registry always has a default per capability.
                Err(reason) => {
                    push_unique_warning(&mut warnings, reason);
                    requested.unwrap_or_default()
                }
            }
        };

        let image_model = model_for("FRAMESHIFT_IMAGE_MODEL", Capability::Image);
        let text_model = model_for("FRAMESHIFT_TEXT_MODEL", Capability::Text);
        let video_model = model_for("FRAMESHIFT_VIDEO_MODEL", Capability::Video);

        let poll_interval = lookup("FRAMESHIFT_POLL_INTERVAL_SECS")
            .and_then(|raw| parse_seconds(&raw, "FRAMESHIFT_POLL_INTERVAL_SECS", &mut warnings))
            .map(|secs| Duration::from_secs_f64(secs.clamp(1.0, 300.0)))
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        let request_timeout = lookup("FRAMESHIFT_REQUEST_TIMEOUT_SECS")
            .and_then(|raw| {
                parse_seconds(&raw, "FRAMESHIFT_REQUEST_TIMEOUT_SECS", &mut warnings)
            })
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
            .clamp(5.0, 900.0);
        let max_polls = lookup("FRAMESHIFT_MAX_POLLS").and_then(|raw| match raw.parse::<u32>() {
            Ok(0) => None,
            Ok(value) => Some(value),
            Err(_) => {
                push_unique_warning(
                    &mut warnings,
                    format!("FRAMESHIFT_MAX_POLLS '{raw}' is not a whole number; polling is unbounded."),
                );
                None
            }
        });

        Self {
            api_base: lookup("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            image_model,
            text_model,
            video_model,
            poll_interval,
            max_polls,
            request_timeout: Duration::from_secs_f64(request_timeout),
            output_dir: lookup("FRAMESHIFT_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("frameshift")),
            warnings,
        }
    }

    pub fn with_max_polls(mut self, max_polls: Option<u32>) -> Self {
        self.max_polls = max_polls;
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model_endpoint(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:{}", self.api_base, model_path, method)
    }

    /// Status URL for a long-running operation resource name.
    pub fn operation_endpoint(&self, operation_name: &str) -> String {
        format!(
            "{}/{}",
            self.api_base,
            operation_name.trim().trim_start_matches('/')
        )
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_seconds(raw: &str, key: &str, warnings: &mut Vec<String>) -> Option<f64> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Some(value),
        _ => {
            push_unique_warning(warnings, format!("{key} '{raw}' ignored; using default."));
            None
        }
    }
}

fn push_unique_warning(warnings: &mut Vec<String>, message: String) {
    if message.trim().is_empty() {
        return;
    }
    if warnings.iter().any(|existing| existing == &message) {
        return;
    }
    warnings.push(message);
}
