//! Revocation records of an offline CA, kept in a JSON file.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use eyre::WrapErr as _;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::api::RevokeRequest;

/// Database section of the offline CA configuration.
///
/// # Example JSON
///
/// ```json
/// {
///   "type": "json",
///   "dataSource": "db/revoked.json"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbConfig {
    #[serde(rename = "type")]
    pub kind: DbKind,

    /// File holding the records; relative paths resolve against the configuration directory.
    pub data_source: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbKind {
    Json,
}

/// A revoked certificate, as recorded by the CA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokedCertificate {
    pub serial: String,
    pub reason_code: u8,

    #[serde(default)]
    pub reason: String,

    pub passive: bool,

    /// Unix timestamp of the revocation.
    pub revoked_at: i64,

    /// Whether the request was authorized by the client certificate rather than a token.
    #[serde(default)]
    pub mtls: bool,

    /// Provisioner whose token authorized the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioner: Option<String>,
}

impl RevokedCertificate {
    pub(crate) fn new(req: &RevokeRequest, provisioner: Option<String>) -> Self {
        RevokedCertificate {
            serial: req.serial.clone(),
            reason_code: req.reason_code,
            reason: req.reason.clone(),
            passive: req.passive,
            revoked_at: time::OffsetDateTime::now_utc().unix_timestamp(),
            mtls: !req.has_token(),
            provisioner,
        }
    }
}

/// Revoked certificates keyed by serial number, written through to disk on every change.
#[derive(Debug)]
pub(crate) struct RevocationDb {
    path: PathBuf,
    revoked: Mutex<BTreeMap<String, RevokedCertificate>>,
}

impl RevocationDb {
    /// Opens the database at `path`; a missing file is an empty database.
    pub(crate) fn open(path: &Path) -> eyre::Result<Self> {
        let revoked = if path.exists() {
            let json = fs::read(path)
                .wrap_err_with(|| format!("error reading database {}", path.display()))?;
            serde_json::from_slice(&json)
                .wrap_err_with(|| format!("error parsing database {}", path.display()))?
        } else {
            BTreeMap::new()
        };

        log::debug!("opened revocation database {}", path.display());

        Ok(RevocationDb {
            path: path.to_owned(),
            revoked: Mutex::new(revoked),
        })
    }

    pub(crate) fn get(&self, serial: &str) -> Option<RevokedCertificate> {
        self.revoked.lock().get(serial).cloned()
    }

    /// Records `cert`, failing if its serial number is already revoked.
    pub(crate) fn insert(&self, cert: RevokedCertificate) -> eyre::Result<()> {
        let mut revoked = self.revoked.lock();
        if revoked.contains_key(&cert.serial) {
            eyre::bail!("certificate with serial number {} is already revoked", cert.serial);
        }

        let serial = cert.serial.clone();
        revoked.insert(serial.clone(), cert);

        if let Err(err) = self.persist(&revoked) {
            revoked.remove(&serial);
            return Err(err);
        }

        Ok(())
    }

    fn persist(&self, revoked: &BTreeMap<String, RevokedCertificate>) -> eyre::Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .wrap_err_with(|| format!("error creating {}", dir.display()))?;
        }

        // replace the file in one step so readers never see a partial write
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(revoked)?)
            .wrap_err_with(|| format!("error writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .wrap_err_with(|| format!("error writing database {}", self.path.display()))
    }
}
