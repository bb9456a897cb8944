//! Provisioner credentials minting revocation tokens for an online CA.

use std::path::Path;

use eyre::WrapErr as _;
use p256::ecdsa::SigningKey;

use crate::{
    cert::{read_private_key, read_root_pool, sha256_fingerprint},
    jws,
    token::TokenBuilder,
};

/// A provisioner's name and signing key.
#[derive(Debug, Clone)]
pub struct Provisioner {
    name: String,
    key: SigningKey,
}

impl Provisioner {
    /// Loads the signing key at `key_path`.
    ///
    /// Without a name, the provisioner is identified by its key's thumbprint.
    pub fn load(key_path: &Path, name: Option<String>) -> eyre::Result<Self> {
        let key = SigningKey::from(
            read_private_key(key_path).context("error loading provisioner key")?,
        );

        let name = match name.filter(|name| !name.is_empty()) {
            Some(name) => name,
            None => jws::thumbprint(key.verifying_key())?,
        };

        Ok(Provisioner { name, key })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mints a token authorizing the revocation of `serial` at the CA at `ca_url`.
    ///
    /// The token pins the first root of `root_path`, so that it alone is enough to locate and
    /// trust the CA.
    pub fn revoke_token(&self, serial: &str, ca_url: &str, root_path: &Path) -> eyre::Result<String> {
        let roots = read_root_pool(root_path)?;

        TokenBuilder::new(self.name.clone(), ca_url)
            .root_fingerprint(sha256_fingerprint(&roots[0]))
            .sign(serial, &self.key)
    }
}
