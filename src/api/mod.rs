//! JSON API payloads exchanged with an online CA.
//!
//! Not intended to be used directly. Provided to aid debugging.

use std::fmt;

use serde::{Deserialize, Serialize};

mod revocation;
mod root;

pub use self::{
    revocation::{RevokeRequest, RevokeResponse},
    root::RootResponse,
};

/// Error body returned by the CA for non-success responses.
///
/// # Example JSON
///
/// ```json
/// {
///   "status": 401,
///   "message": "Unauthorized"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaError {
    pub status: u16,

    #[serde(default)]
    pub message: String,
}

impl CaError {
    pub(crate) fn from_body(status: u16, body: &str) -> Self {
        serde_json::from_str::<CaError>(body).unwrap_or_else(|err| CaError {
            status,
            message: format!("failed to deserialize error ({err}) body: {body}"),
        })
    }
}

impl fmt::Display for CaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "the CA responded with status {}", self.status)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for CaError {}
