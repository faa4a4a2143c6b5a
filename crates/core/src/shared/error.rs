use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure taxonomy shared by media primitives, strategies and pipelines.
///
/// Only [`BlanketError::ExternalService`] with `retryable: true` and
/// [`BlanketError::Timeout`] are worth retrying; everything else is fatal
/// for the media unit being processed.
#[derive(Error, Debug)]
pub enum BlanketError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("frame index {index} out of range <0, {total})")]
    FrameOutOfRange { index: i64, total: usize },
    #[error("could not decode frame {index}: {reason}")]
    FrameDecode { index: usize, reason: String },
    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("detector failed: {0}")]
    Detector(String),
    #[error("video sink failed: {0}")]
    VideoSink(String),
    #[error("external service failed: {message}")]
    ExternalService { message: String, retryable: bool },
    #[error("external call timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0} is not supported")]
    Unsupported(String),
    #[error("no frame produced an acceptable reference after {attempts} attempts")]
    NoAcceptableReference { attempts: usize },
    #[error("operation cancelled")]
    Cancelled,
}

pub type BlanketResult<T> = Result<T, BlanketError>;

impl BlanketError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BlanketError::ExternalService {
                retryable: true,
                ..
            } | BlanketError::Timeout(_)
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BlanketError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn external(message: impl Into<String>, retryable: bool) -> Self {
        BlanketError::ExternalService {
            message: message.into(),
            retryable,
        }
    }
}
