//! Certificate authority clients.
//!
//! Revocation goes through the [`CaClient`] capability, implemented by [`OnlineCa`] for CAs
//! reachable over HTTPS and by [`OfflineCa`] for a CA configured on the local machine.

use async_trait::async_trait;

use crate::{api::RevokeRequest, transport::MtlsTransport};

mod db;
mod offline;
mod online;

pub use self::{
    db::{DbConfig, DbKind, RevokedCertificate},
    offline::{OfflineCa, OfflineCaConfig, ProvisionerConfig},
    online::{OnlineCa, RootTrust},
};

/// A certificate authority accepting revocation requests.
#[async_trait]
pub trait CaClient: Send + Sync {
    /// Passively revokes the certificate named by `req`.
    ///
    /// Without a bearer token in `req`, `transport` carries the client certificate that
    /// authorizes the request. Clients that are not networked ignore it.
    async fn revoke(&self, req: &RevokeRequest, transport: Option<&MtlsTransport>) -> eyre::Result<()>;

    /// Human readable location of the CA.
    fn endpoint(&self) -> &str;
}
