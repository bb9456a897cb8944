//! Revocation tokens.
//!
//! Tokens are compact ES256 JWTs minted by a provisioner. On the client side their claims are
//! only ever read as routing metadata: the signature and validity window are checked by the CA.

use std::time::Duration;

use p256::ecdsa::SigningKey;
use rand::RngCore as _;
use serde::{Deserialize, Serialize};

use crate::jws::{self, CompactJws, JwsHeader};

/// Lifetime of a generated token.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(5 * 60);

/// Path of the revocation endpoint, relative to the CA URL.
pub const REVOKE_PATH: &str = "/1.0/revoke";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The token is not a well-formed compact JWS.
    #[error("error parsing flag '--token': {0}")]
    Malformed(String),

    /// The token is a JWS but its payload is not a claims set.
    #[error("error parsing flag '--token': invalid claims: {0}")]
    Claims(String),

    #[error("token subject '{subject}' and serial number '{serial}' do not match")]
    SubjectMismatch { subject: String, serial: String },
}

/// The `aud` claim, which may be a single string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Default for Audience {
    fn default() -> Self {
        Audience::Many(Vec::new())
    }
}

impl From<Audience> for Vec<String> {
    fn from(aud: Audience) -> Self {
        match aud {
            Audience::One(aud) => vec![aud],
            Audience::Many(aud) => aud,
        }
    }
}

/// Claims carried by a revocation token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(rename = "sub", default)]
    pub subject: String,

    #[serde(
        rename = "aud",
        default,
        deserialize_with = "deserialize_audience",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub audience: Vec<String>,

    /// SHA-256 fingerprint of the CA root, hex encoded.
    #[serde(rename = "sha", default, skip_serializing_if = "Option::is_none")]
    pub root_fingerprint: Option<String>,

    #[serde(rename = "iss", default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub nbf: Option<i64>,

    #[serde(
        default,
        deserialize_with = "deserialize_numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<i64>,

    #[serde(
        default,
        deserialize_with = "deserialize_numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub exp: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<Audience>::deserialize(deserializer).map(|aud| aud.unwrap_or_default().into())
}

/// Reads a NumericDate, which may carry a fractional part, truncated to whole seconds.
fn deserialize_numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer).map(|date| date.map(|secs| secs.floor() as i64))
}

/// CA location suggested by a bootstrap or provisioning token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaHint {
    pub ca_url: String,
    pub root_fingerprint: String,
}

impl TokenClaims {
    /// Extracts the claims of `token` without verifying its signature or validity window.
    pub fn inspect(token: &str) -> Result<Self, TokenError> {
        let jws = CompactJws::parse(token)?;
        Self::from_payload(&jws.payload)
    }

    pub(crate) fn from_payload(payload: &[u8]) -> Result<Self, TokenError> {
        serde_json::from_slice(payload).map_err(|err| TokenError::Claims(err.to_string()))
    }

    /// Checks that the token was minted for the certificate with the given serial number.
    pub fn check_subject(&self, serial: &str) -> Result<(), TokenError> {
        if self.subject.eq_ignore_ascii_case(serial) {
            Ok(())
        } else {
            Err(TokenError::SubjectMismatch {
                subject: self.subject.clone(),
                serial: serial.to_owned(),
            })
        }
    }

    /// Returns the CA URL and pinned root fingerprint, if the token carries both.
    ///
    /// The first audience entry is used when it is an HTTP(S) URL.
    pub fn ca_hint(&self) -> Option<CaHint> {
        let root_fingerprint = self.root_fingerprint.as_deref().filter(|sha| !sha.is_empty())?;
        let ca_url = self.audience.first()?;

        if !ca_url.to_ascii_lowercase().starts_with("http") {
            return None;
        }

        Some(CaHint {
            ca_url: ca_url.clone(),
            root_fingerprint: root_fingerprint.to_owned(),
        })
    }
}

/// Mints revocation tokens signed by a provisioner key.
#[derive(Debug, Clone)]
pub struct TokenBuilder {
    issuer: String,
    audience: String,
    root_fingerprint: Option<String>,
}

impl TokenBuilder {
    /// Tokens for the CA at `ca_url`, whose revocation endpoint becomes the audience.
    pub fn new(issuer: impl Into<String>, ca_url: &str) -> Self {
        TokenBuilder {
            issuer: issuer.into(),
            audience: format!("{}{REVOKE_PATH}", ca_url.trim_end_matches('/')),
            root_fingerprint: None,
        }
    }

    /// Pins the CA root in the `sha` claim.
    pub fn root_fingerprint(mut self, sha: impl Into<String>) -> Self {
        self.root_fingerprint = Some(sha.into());
        self
    }

    /// Signs a token for revoking the certificate with serial number `subject`.
    pub fn sign(&self, subject: &str, key: &SigningKey) -> eyre::Result<String> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let lifetime = i64::try_from(TOKEN_LIFETIME.as_secs())?;

        let mut jti = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut jti);

        let claims = TokenClaims {
            subject: subject.to_owned(),
            audience: vec![self.audience.clone()],
            root_fingerprint: self.root_fingerprint.clone(),
            issuer: Some(self.issuer.clone()),
            nbf: Some(now),
            iat: Some(now),
            exp: Some(now + lifetime),
            jti: Some(hex::encode(jti)),
        };

        let kid = jws::thumbprint(key.verifying_key())?;
        log::debug!("signing revocation token for {subject} with key {kid}");

        jws::sign_compact(&JwsHeader::es256_jwt(kid), &claims, key)
    }
}
