//! API key resolution and the optional host key-selection probe.

use std::fmt;

use tracing::warn;

use crate::config::non_empty_env;
use crate::error::{Result, StudioError};

/// Environment variables checked in order.
pub const CREDENTIAL_ENV_KEYS: [&str; 3] = ["API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"];

pub const MISSING_CREDENTIAL_MESSAGE: &str = "API_KEY environment variable is not set";

#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into().trim().to_string();
        if secret.is_empty() {
            return Err(StudioError::configuration(MISSING_CREDENTIAL_MESSAGE));
        }
        Ok(Self(secret))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Where credentials come from. Resolution is repeated on every call, never cached.
pub trait CredentialSource: Send + Sync {
    fn resolve_credential(&self) -> Result<Credential>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn resolve_credential(&self) -> Result<Credential> {
        resolve_credential()
    }
}

/// A fixed key, for hosts that inject the credential directly.
#[derive(Debug, Clone)]
pub struct StaticCredentials(Option<Credential>);

impl StaticCredentials {
    pub fn new(credential: Option<Credential>) -> Self {
        Self(credential)
    }
}

impl CredentialSource for StaticCredentials {
    fn resolve_credential(&self) -> Result<Credential> {
        self.0
            .clone()
            .ok_or_else(|| StudioError::configuration(MISSING_CREDENTIAL_MESSAGE))
    }
}

pub fn resolve_credential() -> Result<Credential> {
    CREDENTIAL_ENV_KEYS
        .iter()
        .find_map(|key| non_empty_env(key))
        .map(Credential)
        .ok_or_else(|| StudioError::configuration(MISSING_CREDENTIAL_MESSAGE))
}

/// Key-selection hooks some embedding hosts expose.
pub trait HostKeyProbe {
    fn has_selected_key(&self) -> std::result::Result<bool, String>;
    fn open_key_selection(&self) -> std::result::Result<(), String>;
}

/// What to assume when the host probe is missing or errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeFallback {
    /// Treat the key as present and let the first request fail if it is not.
    #[default]
    AssumePresent,
    Require,
}

pub fn key_selection_ready(probe: Option<&dyn HostKeyProbe>, fallback: ProbeFallback) -> bool {
    let outcome = match probe {
        Some(probe) => probe.has_selected_key(),
        None => Err("no host key probe available".to_string()),
    };
    match outcome {
        Ok(selected) => selected,
        Err(reason) => {
            let assumed = fallback == ProbeFallback::AssumePresent;
            warn!(%reason, assumed, "host key probe unavailable");
            assumed
        }
    }
}

/// Opens the host's key picker. The key counts as selected once the dialog opened.
pub fn request_key_selection(probe: Option<&dyn HostKeyProbe>) -> Result<bool> {
    let Some(probe) = probe else {
        return Err(StudioError::configuration(
            "API key selection could not be opened. Make sure you are running in a supported environment.",
        ));
    };
    probe.open_key_selection().map_err(|reason| {
        StudioError::configuration(format!("API key selection could not be opened: {reason}"))
    })?;
    Ok(true)
}
