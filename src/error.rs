use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0:?}")]
    NotFound(PathBuf),
    #[error("{0:?} already exists. Remove it first if you want to reinitialize.")]
    AlreadyExists(PathBuf),
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid api_base {0:?}: {1}")]
    InvalidEndpoint(String, url::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no service-account credential: pass --credentials or set GEE_JSON")]
    MissingCredential,
    #[error("failed to read credential file {0:?}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("malformed service-account JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("private key is not a PKCS#8 PEM block")]
    Pem,
    #[error("private key rejected: {0}")]
    KeyRejected(String),
    #[error("failed to sign token assertion")]
    Signing,
    #[error("token endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("token request failed: {0}")]
    Transport(String),
}

/// Errors raised while talking to the remote geospatial backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<ureq::Error> for BackendError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let message = response
                    .into_string()
                    .unwrap_or_else(|_| "<unreadable body>".to_string());
                BackendError::Status { status, message }
            }
            ureq::Error::Transport(t) => BackendError::Transport(t.to_string()),
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

/// Errors a handler can raise; the dispatcher turns these into
/// [`crate::outcome::Outcome::Failure`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("expected a number for '{key}', got {found}")]
    NotANumber { key: String, found: String },
    #[error("time series is not available for {0}")]
    TimeSeriesUnsupported(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("no tile layers: {0}")]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("nothing to report: run an analysis first")]
    NoCachedRun,
    #[error("pdf generation failed: {0}")]
    Pdf(String),
    #[error("chart image {0:?} could not be embedded: {1}")]
    ChartImage(PathBuf, String),
    #[error("chart rendering failed: {0}")]
    Chart(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<printpdf::Error> for ReportError {
    fn from(err: printpdf::Error) -> Self {
        ReportError::Pdf(err.to_string())
    }
}
