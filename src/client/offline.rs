use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use eyre::{eyre, WrapErr as _};
use p256::ecdsa::SigningKey;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{
    db::{DbConfig, RevocationDb, RevokedCertificate},
    CaClient,
};
use crate::{
    api::RevokeRequest,
    cert::{
        check_validity, public_key_matches, read_certificate_bundle, read_private_key,
        serial_number, sha256_fingerprint, verify_issued_by,
    },
    jws::CompactJws,
    token::{TokenBuilder, TokenClaims, REVOKE_PATH},
    transport::MtlsTransport,
};

/// Clock skew tolerated when checking token validity windows.
const TOKEN_LEEWAY_SECS: i64 = 60;

/// Local CA configuration.
///
/// Relative paths are resolved against the directory holding the configuration file.
///
/// # Example JSON
///
/// ```json
/// {
///   "root": "certs/root_ca.crt",
///   "crt": "certs/intermediate_ca.crt",
///   "address": ":9000",
///   "dnsNames": ["ca.example.com"],
///   "provisioner": {
///     "name": "admin",
///     "key": "secrets/provisioner_key"
///   },
///   "db": {
///     "type": "json",
///     "dataSource": "db/revoked.json"
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineCaConfig {
    /// Root certificate.
    pub root: PathBuf,

    /// Intermediate certificate issuing end-entity certificates.
    pub crt: PathBuf,

    /// Listen address of the CA, used to derive token audiences.
    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub dns_names: Vec<String>,

    pub provisioner: ProvisionerConfig,

    /// Where revocations are recorded. Without it the CA cannot revoke.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<DbConfig>,
}

/// Provisioner used to mint and verify revocation tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    pub name: String,

    /// PKCS#8 or SEC1 PEM encoded P-256 signing key.
    pub key: PathBuf,
}

impl OfflineCaConfig {
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let json = fs::read_to_string(path)
            .wrap_err_with(|| format!("error reading {}", path.display()))?;
        let mut config = serde_json::from_str::<OfflineCaConfig>(&json)
            .wrap_err_with(|| format!("error parsing {}", path.display()))?;

        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let db = config.db.as_mut().map(|db| &mut db.data_source);
        for file in [&mut config.root, &mut config.crt, &mut config.provisioner.key]
            .into_iter()
            .chain(db)
        {
            if file.is_relative() {
                *file = dir.join(&*file);
            }
        }

        Ok(config)
    }

    /// Base URL the CA is served on.
    pub fn ca_url(&self) -> String {
        let host = self
            .dns_names
            .first()
            .map(String::as_str)
            .unwrap_or("localhost");

        let port = self
            .address
            .rsplit_once(':')
            .map(|(_, port)| port)
            .filter(|port| !port.is_empty() && *port != "443");

        match port {
            Some(port) => format!("https://{host}:{port}"),
            None => format!("https://{host}"),
        }
    }
}

#[derive(Debug)]
struct OfflineCaInner {
    config: OfflineCaConfig,
    root_fingerprint: String,
    intermediate: x509_cert::Certificate,
    provisioner_key: SigningKey,

    /// Serial numbers of client certificates verified by [`OfflineCa::verify_client_cert`].
    verified: Mutex<HashSet<String>>,

    db: Option<RevocationDb>,
}

/// CA configured on the local machine.
///
/// Requests are authorized in-process with the CA's own trust material; nothing goes over the
/// network.
#[derive(Debug, Clone)]
pub struct OfflineCa {
    inner: Arc<OfflineCaInner>,
}

impl OfflineCa {
    /// Loads the CA from its configuration file.
    pub fn load(path: &Path) -> eyre::Result<Self> {
        log::debug!("loading offline CA from {}", path.display());
        Self::new(OfflineCaConfig::load(path)?)
    }

    pub fn new(config: OfflineCaConfig) -> eyre::Result<Self> {
        let root = read_certificate_bundle(&config.root)?;
        let root_fingerprint = sha256_fingerprint(&der::Encode::to_der(&root[0])?);

        let intermediate = read_certificate_bundle(&config.crt)?.swap_remove(0);

        let provisioner_key = read_private_key(&config.provisioner.key)
            .wrap_err_with(|| format!("error loading provisioner '{}'", config.provisioner.name))?;

        let db = config
            .db
            .as_ref()
            .map(|db| RevocationDb::open(&db.data_source))
            .transpose()?;

        Ok(OfflineCa {
            inner: Arc::new(OfflineCaInner {
                config,
                root_fingerprint,
                intermediate,
                provisioner_key: SigningKey::from(provisioner_key),
                verified: Mutex::new(HashSet::new()),
                db,
            }),
        })
    }

    pub fn config(&self) -> &OfflineCaConfig {
        &self.inner.config
    }

    /// Checks that the certificate bundle and key form a pair issued by this CA.
    ///
    /// Once verified, the certificate authorizes its own revocation without a token.
    pub fn verify_client_cert(&self, cert_path: &Path, key_path: &Path) -> eyre::Result<()> {
        let chain = read_certificate_bundle(cert_path)?;
        let leaf = &chain[0];

        let key = read_private_key(key_path).context("error parsing key")?;
        if !public_key_matches(leaf, &key)? {
            eyre::bail!("error loading certificate key pair: private key does not match public key");
        }

        verify_issued_by(leaf, &self.inner.intermediate)
            .and_then(|()| check_validity(leaf))
            .wrap_err("error verifying client certificate")?;

        let serial = serial_number(leaf);
        log::debug!("verified client certificate with serial number {serial}");
        self.inner.verified.lock().insert(serial);

        Ok(())
    }

    /// Mints a revocation token for `serial` with the configured provisioner.
    pub fn generate_token(&self, serial: &str) -> eyre::Result<String> {
        TokenBuilder::new(self.inner.config.provisioner.name.clone(), &self.inner.config.ca_url())
            .root_fingerprint(self.inner.root_fingerprint.clone())
            .sign(serial, &self.inner.provisioner_key)
    }

    /// Returns the revocation record of the certificate, if it has been revoked.
    pub fn revocation(&self, serial: &str) -> Option<RevokedCertificate> {
        self.inner.db.as_ref()?.get(serial)
    }

    pub fn is_revoked(&self, serial: &str) -> bool {
        self.revocation(serial).is_some()
    }

    fn authorize_token(&self, req: &RevokeRequest) -> eyre::Result<()> {
        let jws = CompactJws::parse(&req.ott)?;
        jws.verify(self.inner.provisioner_key.verifying_key())?;

        let claims = TokenClaims::from_payload(&jws.payload)?;
        claims.check_subject(&req.serial)?;

        let provisioner = &self.inner.config.provisioner.name;
        if claims.issuer.as_deref() != Some(provisioner.as_str()) {
            eyre::bail!("token issuer does not match provisioner '{provisioner}'");
        }

        let audience = format!("{}{REVOKE_PATH}", self.inner.config.ca_url());
        if !claims.audience.iter().any(|aud| *aud == audience) {
            eyre::bail!("token audience does not include {audience}");
        }

        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let nbf = claims.nbf.unwrap_or(i64::MIN);
        let exp = claims.exp.ok_or_else(|| eyre!("token has no expiration"))?;
        if now + TOKEN_LEEWAY_SECS < nbf {
            eyre::bail!("token is not yet valid");
        }
        if now - TOKEN_LEEWAY_SECS > exp {
            eyre::bail!("token has expired");
        }

        Ok(())
    }
}

#[async_trait]
impl CaClient for OfflineCa {
    async fn revoke(&self, req: &RevokeRequest, _transport: Option<&MtlsTransport>) -> eyre::Result<()> {
        let provisioner = if req.has_token() {
            self.authorize_token(req).context("error authorizing revocation")?;
            Some(self.inner.config.provisioner.name.clone())
        } else if self.inner.verified.lock().contains(&req.serial) {
            None
        } else {
            eyre::bail!(
                "error authorizing revocation: a token or a verified client certificate is required"
            );
        };

        let db = self.inner.db.as_ref().ok_or_else(|| {
            eyre!("error revoking certificate: the offline CA has no database configured")
        })?;

        log::info!(
            "passively revoking certificate {} (reason code {})",
            req.serial,
            req.reason_code
        );
        db.insert(RevokedCertificate::new(req, provisioner))
    }

    fn endpoint(&self) -> &str {
        "offline"
    }
}
