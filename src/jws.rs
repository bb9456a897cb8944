//! Compact serialization of ES256 JSON Web Signatures.
//!
//! See [RFC 7515 §7.1](https://datatracker.ietf.org/doc/html/rfc7515#section-7.1).

use base64::prelude::*;
use eyre::eyre;
use p256::ecdsa::{
    signature::{Signer as _, Verifier as _},
    Signature, SigningKey, VerifyingKey,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::token::TokenError;

/// JOSE header of a compact JWS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub(crate) struct JwsHeader {
    /// Algorithm.
    ///
    /// Only "ES256" is ever produced or verified here.
    pub alg: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    /// Key ID, the RFC 7638 thumbprint of the signing key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl JwsHeader {
    pub(crate) fn es256_jwt(kid: String) -> Self {
        JwsHeader {
            alg: "ES256".to_owned(),
            typ: Some("JWT".to_owned()),
            kid: Some(kid),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub(crate) struct Jwk {
    crv: String,
    kty: String,
    x: String,
    y: String,
}

impl From<&VerifyingKey> for Jwk {
    fn from(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);

        // uncompressed points always carry both coordinates
        let x = point.x().map(|x| x.as_slice()).unwrap_or_default();
        let y = point.y().map(|y| y.as_slice()).unwrap_or_default();

        Jwk {
            kty: "EC".to_owned(),
            crv: "P-256".to_owned(),
            x: BASE64_URL_SAFE_NO_PAD.encode(x),
            y: BASE64_URL_SAFE_NO_PAD.encode(y),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
// LEXICAL ORDER OF FIELDS MATTER!
pub(crate) struct JwkThumb {
    crv: String,
    kty: String,
    x: String,
    y: String,
}

impl From<&Jwk> for JwkThumb {
    fn from(a: &Jwk) -> Self {
        JwkThumb {
            crv: a.crv.clone(),
            kty: a.kty.clone(),
            x: a.x.clone(),
            y: a.y.clone(),
        }
    }
}

/// JWK thumbprint as defined in [RFC 7638].
///
/// [RFC 7638]: https://datatracker.ietf.org/doc/html/rfc7638
pub(crate) fn thumbprint(key: &VerifyingKey) -> eyre::Result<String> {
    let jwk = Jwk::from(key);
    let json = serde_json::to_string(&JwkThumb::from(&jwk))?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(json)))
}

/// Signs `claims` and returns the compact `header.payload.signature` form.
pub(crate) fn sign_compact<T: Serialize + ?Sized>(
    header: &JwsHeader,
    claims: &T,
    key: &SigningKey,
) -> eyre::Result<String> {
    let header = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_string(header)?);
    let payload = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_string(claims)?);

    let to_sign = format!("{header}.{payload}");
    let signature: Signature = key.try_sign(to_sign.as_bytes())?;
    let signature = BASE64_URL_SAFE_NO_PAD.encode(signature.to_bytes());

    Ok(format!("{to_sign}.{signature}"))
}

/// A parsed, not yet verified, compact JWS.
#[derive(Debug, Clone)]
pub(crate) struct CompactJws {
    pub header: JwsHeader,
    pub payload: Vec<u8>,
    signing_input: String,
    signature: Vec<u8>,
}

impl CompactJws {
    pub(crate) fn parse(token: &str) -> Result<Self, TokenError> {
        let token = token.trim();
        let mut parts = token.split('.');

        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed(
                "compact JWS format must have three parts".to_owned(),
            ));
        };

        let signing_input = format!("{header}.{payload}");

        let header_json = decode_segment(header, "header")?;
        let header = serde_json::from_slice::<JwsHeader>(&header_json)
            .map_err(|err| TokenError::Malformed(format!("invalid header: {err}")))?;
        if header.alg.is_empty() {
            return Err(TokenError::Malformed("missing algorithm".to_owned()));
        }

        let payload_bytes = decode_segment(payload, "payload")?;

        let signature_bytes = decode_segment(signature, "signature")?;
        if signature_bytes.is_empty() {
            return Err(TokenError::Malformed("missing signature".to_owned()));
        }

        Ok(CompactJws {
            header,
            payload: payload_bytes,
            signing_input,
            signature: signature_bytes,
        })
    }

    /// Checks the ES256 signature against `key`.
    pub(crate) fn verify(&self, key: &VerifyingKey) -> eyre::Result<()> {
        if self.header.alg != "ES256" {
            eyre::bail!("unsupported token algorithm '{}'", self.header.alg);
        }

        let signature = Signature::from_slice(&self.signature)
            .map_err(|err| eyre!("malformed token signature: {err}"))?;

        key.verify(self.signing_input.as_bytes(), &signature)
            .map_err(|_| eyre!("token signature verification failed"))
    }
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, TokenError> {
    BASE64_URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|err| TokenError::Malformed(format!("invalid {name} encoding: {err}")))
}
