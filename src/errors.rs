use serde::{Deserialize, Serialize};

/// Canonical error taxonomy. Every failure crossing a component boundary is
/// mapped to one of these kinds before it reaches the envelope (C1) or the
/// HTTP surface (C9) — never matched by message string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Validation,
    NotFound,
    Unauthorized,
    Upstream,
    Transport,
    Internal,
    Conflict,
}

impl Kind {
    /// HTTP status mapping from the C9 design: the only place this mapping
    /// is allowed to live.
    pub fn http_status(self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Kind::Validation => StatusCode::BAD_REQUEST,
            Kind::NotFound => StatusCode::NOT_FOUND,
            Kind::Unauthorized => StatusCode::UNAUTHORIZED,
            Kind::Conflict => StatusCode::CONFLICT,
            Kind::Upstream => StatusCode::BAD_GATEWAY,
            Kind::Transport => StatusCode::GATEWAY_TIMEOUT,
            Kind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RegistryError {
    pub fn kind(&self) -> Kind {
        match self {
            RegistryError::Validation(_) => Kind::Validation,
            RegistryError::NotFound(_) => Kind::NotFound,
            RegistryError::Unauthorized(_) => Kind::Unauthorized,
            RegistryError::Upstream(_) => Kind::Upstream,
            RegistryError::Transport(_) => Kind::Transport,
            RegistryError::Conflict(_) => Kind::Conflict,
            RegistryError::Internal(_) => Kind::Internal,
        }
    }

    pub fn message(&self) -> String {
        match self {
            RegistryError::Internal(e) => e.to_string(),
            other => other.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        RegistryError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        RegistryError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        RegistryError::Conflict(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        RegistryError::Upstream(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        RegistryError::Transport(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Marker wrapped into an `anyhow::Error` chain to signal that a failure is
/// an internal invariant violation (spec exit code 2) rather than an
/// ordinary startup failure (exit code 1, malformed config / port bind
/// failure). Recovered by `main` via `anyhow::Error::downcast_ref`.
#[derive(Debug)]
pub struct InvariantViolation(pub String);

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "internal invariant violation: {}", self.0)
    }
}

impl std::error::Error for InvariantViolation {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_to_expected_status() {
        assert_eq!(Kind::Validation.http_status(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(Kind::NotFound.http_status(), axum::http::StatusCode::NOT_FOUND);
        assert_eq!(Kind::Conflict.http_status(), axum::http::StatusCode::CONFLICT);
        assert_eq!(Kind::Upstream.http_status(), axum::http::StatusCode::BAD_GATEWAY);
        assert_eq!(Kind::Transport.http_status(), axum::http::StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(Kind::Internal.http_status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_wraps_anyhow() {
        let e: RegistryError = anyhow::anyhow!("boom").into();
        assert_eq!(e.kind(), Kind::Internal);
        assert_eq!(e.message(), "boom");
    }
}
