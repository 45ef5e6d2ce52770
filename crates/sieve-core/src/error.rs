use std::fmt;

#[derive(Debug)]
pub enum CoreError {
    Json(serde_json::Error),
    InvalidModel(String),
    InvalidPolicy(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Json(e) => write!(f, "model JSON error: {e}"),
            CoreError::InvalidModel(msg) => write!(f, "invalid model: {msg}"),
            CoreError::InvalidPolicy(msg) => write!(f, "invalid policy: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::Json(e) => Some(e),
            CoreError::InvalidModel(_) | CoreError::InvalidPolicy(_) => None,
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
