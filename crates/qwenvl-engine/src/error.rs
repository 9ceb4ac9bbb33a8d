use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("remote service error: {0}")]
    RemoteService(String),

    #[error("remote service returned status {status}{}: {message}", code_suffix(.code))]
    RemoteStatus {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|code| format!(" ({code})"))
        .unwrap_or_default()
}

impl NodeError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        NodeError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        NodeError::RemoteService(format!("malformed response: {}", detail.into()))
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "E_CONFIGURATION",
            Self::Validation(_) => "E_VALIDATION",
            Self::RemoteService(_) | Self::RemoteStatus { .. } => "E_REMOTE_SERVICE",
            Self::Image(_) => "E_IMAGE",
            Self::Io { .. } => "E_IO",
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteService(_) | Self::RemoteStatus { .. })
    }
}
