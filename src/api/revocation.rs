use serde::{Deserialize, Serialize};

/// Certificate revocation request.
///
/// # Example JSON
///
/// ```json
/// {
///   "serial": "308893286343609293989051180431574390766",
///   "reasonCode": 1,
///   "reason": "laptop compromised",
///   "passive": true,
///   "ott": "eyJhbGciOiJFUzI1NiIs..."
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    /// Serial number of the certificate, in decimal.
    pub serial: String,

    /// One of the revocation reasonCodes defined in [RFC 5280 §5.3.1].
    ///
    /// [RFC 5280 §5.3.1]: https://datatracker.ietf.org/doc/html/rfc5280#section-5.3.1
    pub reason_code: u8,

    /// Free text explanation.
    #[serde(default)]
    pub reason: String,

    /// Passive revocation only prevents renewal of the certificate.
    pub passive: bool,

    /// One-time bearer token authorizing the request.
    ///
    /// Empty when the request is authorized by the mTLS client certificate instead.
    #[serde(default)]
    pub ott: String,
}

impl RevokeRequest {
    pub fn new(serial: String, reason_code: u8, reason: String, ott: Option<String>) -> Self {
        Self {
            serial,
            reason_code,
            reason,
            passive: true,
            ott: ott.unwrap_or_default(),
        }
    }

    /// Returns true if a bearer token authorizes this request.
    pub fn has_token(&self) -> bool {
        !self.ott.is_empty()
    }
}

/// Response to a successful revocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeResponse {
    pub status: String,
}
