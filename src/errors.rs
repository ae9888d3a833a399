//! Crate-wide error types.

use std::fmt;

use anyhow::Error as AnyhowError;
use serde::{Deserialize, Serialize};

/// The status-code taxonomy carried on every `DistrictResult` and HTTP error
/// response.
///
/// Grouped by origin, matching the propagation policy: input validation
/// fails fast with no providers called; provider-level failures are caught
/// and converted to the corresponding upstream status without aborting the
/// batch or fallback chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    // Input
    MissingAddress,
    MissingGeocode,
    MissingPoint,
    MissingInputParams,
    InsufficientAddress,
    InvalidAddress,
    InvalidGeocode,
    NonNyState,

    // Provider selection
    ServiceNotSupported,
    ProviderNotSupported,

    // Upstream
    ResponseMissingError,
    ResponseParseError,
    NoGeocodeResult,
    NoReverseGeocodeResult,
    NoAddressValidateResult,
    NoDistrictResult,

    // Partial success
    PartialDistrictResult,
    MultipleDistrictResult,

    // Internal
    InternalError,
    DatabaseError,

    // Success
    Success,
}

impl StatusCode {
    /// Is this status a form of success (possibly partial)?
    pub fn is_success(self) -> bool {
        matches!(
            self,
            StatusCode::Success
                | StatusCode::PartialDistrictResult
                | StatusCode::MultipleDistrictResult
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `serde` already knows how to render these as SCREAMING_SNAKE_CASE;
        // reuse that instead of hand-maintaining a second table.
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(|s| s.to_owned()))
            .unwrap_or_else(|| "INTERNAL_ERROR".to_owned());
        f.write_str(&s)
    }
}

/// An error that carries a [`StatusCode`] for the caller plus the full
/// `anyhow` chain for logs.
#[derive(Debug)]
pub struct ResolverError {
    pub status: StatusCode,
    pub source: AnyhowError,
}

impl ResolverError {
    pub fn new(status: StatusCode, source: AnyhowError) -> Self {
        ResolverError { status, source }
    }

    pub fn msg<S: Into<String>>(status: StatusCode, message: S) -> Self {
        ResolverError {
            status,
            source: anyhow::anyhow!(message.into()),
        }
    }
}

impl fmt::Display for ResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.source)
    }
}

impl std::error::Error for ResolverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.source()
    }
}

impl From<ResolverError> for AnyhowError {
    fn from(err: ResolverError) -> Self {
        anyhow::anyhow!(err)
    }
}

/// Print an error and its full chain of causes, followed by a backtrace if
/// one is available. Used by the CLI entry point on fatal startup errors.
pub fn display_causes_and_backtrace(err: &AnyhowError) {
    eprintln!("Error: {}", err);
    for cause in err.chain().skip(1) {
        eprintln!("  caused by: {}", cause);
    }
    let backtrace = err.backtrace();
    if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
        eprintln!("{}", backtrace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_display_is_screaming_snake_case() {
        assert_eq!(StatusCode::Success.to_string(), "SUCCESS");
        assert_eq!(StatusCode::NonNyState.to_string(), "NON_NY_STATE");
        assert_eq!(
            StatusCode::PartialDistrictResult.to_string(),
            "PARTIAL_DISTRICT_RESULT"
        );
    }

    #[test]
    fn is_success_covers_partial_statuses() {
        assert!(StatusCode::Success.is_success());
        assert!(StatusCode::PartialDistrictResult.is_success());
        assert!(StatusCode::MultipleDistrictResult.is_success());
        assert!(!StatusCode::NoGeocodeResult.is_success());
    }
}
