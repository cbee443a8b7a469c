//! External link opening: validation and the `{ok, error}` reply contract.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::BridgeError;

/// URL schemes the shell is willing to hand to the system opener.
pub const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Opens a URL with whatever the host platform uses for links.
pub trait LinkOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), BridgeError>;
}

/// Reply to an open-external request. Never an error at the transport level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OpenReply {
    pub fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

pub fn validate_url(url: &str) -> Result<(), BridgeError> {
    let invalid = |reason| BridgeError::InvalidUrl {
        url: url.to_string(),
        reason,
    };

    let url = url.trim();
    if url.is_empty() {
        return Err(invalid("empty"));
    }
    let (scheme, rest) = url.split_once(':').ok_or_else(|| invalid("missing scheme"))?;
    if !ALLOWED_SCHEMES
        .iter()
        .any(|allowed| scheme.eq_ignore_ascii_case(allowed))
    {
        return Err(invalid("scheme not allowed"));
    }
    if rest.trim_start_matches('/').is_empty() {
        return Err(invalid("missing target"));
    }
    Ok(())
}

/// Validate and open `url`, folding every failure into the reply.
pub fn open_external(opener: &dyn LinkOpener, url: &str) -> OpenReply {
    info!(%url, "open-external requested");
    let result = validate_url(url).and_then(|()| opener.open(url.trim()));
    match result {
        Ok(()) => OpenReply::ok(),
        Err(e) => {
            warn!(%url, error = %e, "open-external failed");
            OpenReply::failed(e.to_string())
        }
    }
}
