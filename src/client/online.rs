use std::path::PathBuf;

use async_trait::async_trait;
use eyre::{eyre, WrapErr as _};

use super::CaClient;
use crate::{
    api::{CaError, RevokeRequest, RevokeResponse, RootResponse},
    cert::{read_pem_chain, read_root_pool, sha256_fingerprint},
    token::REVOKE_PATH,
    transport::{MtlsTransport, CONNECT_TIMEOUT},
};

/// How the client establishes trust in the CA's TLS certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootTrust {
    /// Roots read from a PEM file.
    File(PathBuf),

    /// The root whose SHA-256 fingerprint matches, as served by the CA itself.
    Sha256(String),
}

/// CA reachable over HTTPS.
#[derive(Debug, Clone)]
pub struct OnlineCa {
    url: reqwest::Url,
    endpoint: String,
    root: RootTrust,
}

impl OnlineCa {
    /// Creates a client for the CA at `ca_url`.
    ///
    /// Only the scheme, host and port of `ca_url` are used. A URL without scheme is assumed to be
    /// HTTPS.
    pub fn new(ca_url: &str, root: RootTrust) -> eyre::Result<Self> {
        let ca_url = ca_url.trim();
        let url = if ca_url.contains("://") {
            reqwest::Url::parse(ca_url)
        } else {
            reqwest::Url::parse(&format!("https://{ca_url}"))
        }
        .wrap_err_with(|| format!("error parsing CA URL '{ca_url}'"))?;

        if !matches!(url.scheme(), "https" | "http") || url.host_str().is_none() {
            eyre::bail!("invalid CA URL '{ca_url}': expected an https URL");
        }

        Ok(OnlineCa {
            endpoint: url.origin().ascii_serialization(),
            url,
            root,
        })
    }

    pub fn root_trust(&self) -> &RootTrust {
        &self.root
    }

    async fn http_client(&self) -> eyre::Result<reqwest::Client> {
        let roots = match &self.root {
            RootTrust::File(path) => read_root_pool(path)?,
            RootTrust::Sha256(sha) => vec![self.fetch_pinned_root(sha).await?],
        };

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .connect_timeout(CONNECT_TIMEOUT);

        for der in &roots {
            builder = builder.add_root_certificate(reqwest::Certificate::from_der(der)?);
        }

        Ok(builder.build()?)
    }

    /// Downloads the root with fingerprint `sha` and checks that it hashes to it.
    ///
    /// The download itself is not authenticated; the fingerprint is.
    async fn fetch_pinned_root(&self, sha: &str) -> eyre::Result<Vec<u8>> {
        let want = sha.replace(':', "").to_ascii_lowercase();

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .danger_accept_invalid_certs(true)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        let url = self.url.join(&format!("/root/{want}"))?;
        log::debug!("Fetch root: {url}");

        let res = client
            .get(url)
            .send()
            .await
            .context("error downloading root certificate")?;
        let res = handle_error(res).await?;
        let root = res.json::<RootResponse>().await?;

        let der = read_pem_chain(root.root_pem.as_bytes())?
            .into_iter()
            .next()
            .ok_or_else(|| eyre!("error downloading root certificate: no certificate returned"))?;

        let got = sha256_fingerprint(&der);
        if got != want {
            eyre::bail!("root certificate fingerprint mismatch: expected {want}, got {got}");
        }

        Ok(der)
    }
}

#[async_trait]
impl CaClient for OnlineCa {
    async fn revoke(&self, req: &RevokeRequest, transport: Option<&MtlsTransport>) -> eyre::Result<()> {
        let client = match transport {
            Some(transport) => transport.client().clone(),
            None => self.http_client().await?,
        };

        let url = self.url.join(REVOKE_PATH)?;
        log::debug!("Call endpoint: {url}");

        let res = client
            .post(url)
            .json(req)
            .send()
            .await
            .wrap_err_with(|| format!("error revoking certificate with serial number {}", req.serial))?;
        let res = handle_error(res).await?;

        let res = res.json::<RevokeResponse>().await?;
        log::debug!("revoke response status: {}", res.status);

        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Turns non-success responses into a [`CaError`].
async fn handle_error(res: reqwest::Response) -> Result<reqwest::Response, CaError> {
    // ok responses pass through
    if res.status().is_success() {
        return Ok(res);
    }

    let status = res.status().as_u16();
    // the CA sometimes closes the connection abruptly after writing the body
    let body = res.text().await.unwrap_or_default();
    log::trace!("error response {status}: {body}");

    Err(CaError::from_body(status, &body))
}
