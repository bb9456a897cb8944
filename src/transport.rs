//! Mutual TLS transport, authorizing requests with a client certificate.

use std::{fs, path::Path, time::Duration};

use der::Decode as _;
use eyre::WrapErr as _;

use crate::{
    cert::{private_key_pem, public_key_matches, read_pem_chain, read_private_key, read_root_pool},
    config::BasePath,
    error::FlagError,
};

/// Connect timeout of CA-facing HTTP clients.
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum KeyPairError {
    #[error("error loading certificate: certificate chain is empty")]
    ChainEmpty,

    #[error("error loading certificate key pair: private key does not match public key")]
    Mismatch,
}

/// HTTP transport presenting a client certificate.
///
/// Proxies are taken from the environment (`HTTPS_PROXY`, `NO_PROXY`, ...). The client offers the
/// TLS library's default cipher suites and leaves the choice among them to the CA.
#[derive(Debug, Clone)]
pub struct MtlsTransport {
    client: reqwest::Client,
}

impl MtlsTransport {
    /// Builds a transport from the certificate bundle at `cert_path` and its private key.
    ///
    /// Trust anchors are read from `root`, or from the default root location when `None`.
    pub fn build(
        cert_path: &Path,
        key_path: &Path,
        root: Option<&Path>,
        base: &BasePath,
    ) -> eyre::Result<Self> {
        let cert_pem = fs::read(cert_path).context("error reading certificate")?;

        // keys may come in SEC1 or PKCS#8; the identity loader pairs with PKCS#8
        let key = read_private_key(key_path).context("error parsing key")?;
        let key_pem = private_key_pem(&key)?;

        let chain = read_pem_chain(&cert_pem).context("error loading certificate key pair")?;
        let leaf = chain.first().ok_or(KeyPairError::ChainEmpty)?;
        let leaf =
            x509_cert::Certificate::from_der(leaf).context("error loading certificate key pair")?;
        if !public_key_matches(&leaf, &key)? {
            return Err(KeyPairError::Mismatch.into());
        }

        let root = base.resolve_root(root).ok_or(FlagError::RequiredUnless {
            command: crate::COMMAND,
            flag: "root",
            unless: "token",
        })?;
        let roots = read_root_pool(&root)?;

        let mut identity_pem = cert_pem;
        identity_pem.push(b'\n');
        identity_pem.extend_from_slice(key_pem.as_bytes());
        let identity =
            reqwest::Identity::from_pem(&identity_pem).context("error loading certificate key pair")?;

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .identity(identity)
            .connect_timeout(CONNECT_TIMEOUT);

        for der in &roots {
            builder = builder.add_root_certificate(reqwest::Certificate::from_der(der)?);
        }

        log::debug!(
            "built mTLS transport for {} trusting {} root(s) from {}",
            cert_path.display(),
            roots.len(),
            root.display()
        );

        Ok(MtlsTransport {
            client: builder.build().context("error building mTLS transport")?,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}
