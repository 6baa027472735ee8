//! Shared-secret admission gate.
//!
//! The secret travels in the `pwd` query parameter of the upgrade request.
//! An empty configured secret makes the room public.

use serde::Deserialize;

use crate::error::RelayError;

/// Query parameters accepted on the registration path.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AdmissionParams {
    /// Room secret supplied by the client, if any.
    pub pwd: Option<String>,
}

/// Checks a supplied secret against the configured one.
///
/// # Errors
///
/// Returns [`RelayError::AdmissionDenied`] if the room is private and
/// `supplied` is missing or different.
pub fn admit(configured: &str, supplied: Option<&str>) -> Result<(), RelayError> {
    if configured.is_empty() || supplied == Some(configured) {
        Ok(())
    } else {
        Err(RelayError::AdmissionDenied)
    }
}
