use serde::{Deserialize, Serialize};

/// Root certificate returned by `GET /root/{sha256}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootResponse {
    /// PEM encoded root certificate.
    #[serde(rename = "ca")]
    pub root_pem: String,
}
