//! Remote stream source handle

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;

/// URI of a remote audio stream.
///
/// Immutable once constructed. Validation is deferred to [`StreamSource::validate`]
/// so that a bad value from configuration is reported by the engine as
/// `InvalidSource` rather than at deserialization time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamSource(String);

impl StreamSource {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the URI, accepting only http(s) URLs with a host
    pub fn validate(&self) -> Result<Url, EngineError> {
        let trimmed = self.0.trim();
        if trimmed.is_empty() {
            return Err(EngineError::InvalidSource("empty stream URI".to_string()));
        }

        let url = Url::parse(trimmed)
            .map_err(|e| EngineError::InvalidSource(format!("{}: {}", trimmed, e)))?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(EngineError::InvalidSource(format!(
                    "unsupported scheme '{}' in {}",
                    other, trimmed
                )))
            }
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(EngineError::InvalidSource(format!("missing host in {}", trimmed)));
        }

        Ok(url)
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamSource {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_icecast_uri() {
        let source = StreamSource::new("http://media-ice.musicradio.com/CapitalGlasgowMP3");
        let url = source.validate().unwrap();
        assert_eq!(url.host_str(), Some("media-ice.musicradio.com"));
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "   ", "not a uri", "ftp://example.com/stream", "http://"] {
            let err = StreamSource::new(bad).validate().unwrap_err();
            assert!(matches!(err, EngineError::InvalidSource(_)), "accepted {:?}", bad);
        }
    }
}
