//! Error types and error codes.
//!
//! Public client operations never return these: the transport folds every
//! failure into a synthetic `error` event. Only configuration calls surface a
//! [`PushletError`] directly.

/// Prefix of the `p_reason` field on transport-generated error events.
pub const TRANSPORT_REASON_PREFIX: &str = "[pushlet] problem retrieving XML data:\n";

#[derive(Debug, thiserror::Error)]
pub enum PushletError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} {text}")]
    Status { status: u16, text: String },

    #[error("malformed response: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("base url is locked after the first request")]
    BaseUrlLocked,

    #[error("no tokio runtime available")]
    NoRuntime,

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl PushletError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::Http(_) => "http",
            Self::Status { .. } => "status",
            Self::Xml(_) => "xml",
            Self::Malformed(_) => "malformed",
            Self::InvalidUrl { .. } => "invalid_url",
            Self::BaseUrlLocked => "base_url_locked",
            Self::NoRuntime => "no_runtime",
            Self::Config(_) => "config",
        }
    }

    /// Text placed in the `p_reason` field of the synthetic error event.
    pub fn reason(&self) -> String {
        format!("{TRANSPORT_REASON_PREFIX}{self}")
    }
}

impl From<figment::Error> for PushletError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl From<quick_xml::events::attributes::AttrError> for PushletError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(quick_xml::Error::InvalidAttr(err))
    }
}

pub type Result<T, E = PushletError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(PushletError::BaseUrlLocked.error_code(), "base_url_locked");
        assert_eq!(
            PushletError::Status {
                status: 500,
                text: "Internal Server Error".into()
            }
            .error_code(),
            "status"
        );
    }

    #[test]
    fn reason_carries_prefix_and_status() {
        let err = PushletError::Status {
            status: 503,
            text: "Service Unavailable".into(),
        };
        let reason = err.reason();
        assert!(reason.starts_with(TRANSPORT_REASON_PREFIX));
        assert!(reason.ends_with("HTTP 503 Service Unavailable"));
    }
}
