use thiserror::Error;

/// Substring the service uses when the key does not resolve to a project.
pub const ENTITY_NOT_FOUND_MARKER: &str = "Requested entity was not found";

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("{0}")]
    Configuration(String),

    #[error("failed reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("No image data found in the API response.")]
    NoImageInResponse,

    #[error("Generated video link was not found.")]
    NoVideoLink,

    #[error("The model could not produce a text suggestion.")]
    EmptySuggestion,

    #[error("Video could not be downloaded: {status}")]
    Download { status: String },

    #[error("{service} request failed ({status}): {message}")]
    Api {
        service: String,
        status: u16,
        message: String,
    },

    #[error("video operation {operation} failed: {message}")]
    JobFailed { operation: String, message: String },

    #[error("video operation {operation} still running after {polls} status checks")]
    PollLimitExceeded { operation: String, polls: u32 },

    #[error("{0}")]
    Transport(String),
}

impl StudioError {
    pub fn configuration(message: impl Into<String>) -> Self {
        StudioError::Configuration(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        StudioError::MalformedResponse(message.into())
    }

    /// True when the caller should ask the user to pick another credential.
    pub fn requires_key_reselection(&self) -> bool {
        self.to_string().contains(ENTITY_NOT_FOUND_MARKER)
    }
}

pub type Result<T, E = StudioError> = std::result::Result<T, E>;
