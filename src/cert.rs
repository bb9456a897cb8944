//! Certificate and private key material read from PEM files.

use std::{
    fs,
    io::{BufReader, Cursor},
    path::Path,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use der::{Decode as _, Encode as _};
use eyre::{eyre, WrapErr as _};
use p256::{
    ecdsa::{signature::Verifier as _, DerSignature, VerifyingKey},
    pkcs8::{DecodePrivateKey as _, DecodePublicKey as _, EncodePrivateKey as _, EncodePublicKey as _},
};
use sha2::{Digest as _, Sha256};
use x509_cert::spki::ObjectIdentifier;
use zeroize::Zeroizing;

/// `ecdsa-with-SHA256` from RFC 5758 §3.2.
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

/// Reads all certificates of a PEM file in DER encoding, keeping the file's order.
pub(crate) fn read_pem_chain(pem: &[u8]) -> eyre::Result<Vec<Vec<u8>>> {
    let mut rdr = BufReader::new(Cursor::new(pem));

    rustls_pemfile::certs(&mut rdr)
        .map(|res| res.map(|cert| cert.to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(Into::into)
}

/// Reads a PEM certificate bundle; the end-entity certificate comes first.
pub fn read_certificate_bundle(path: &Path) -> eyre::Result<Vec<x509_cert::Certificate>> {
    let pem = fs::read(path).wrap_err_with(|| format!("error reading {}", path.display()))?;

    let certs = read_pem_chain(&pem)
        .wrap_err_with(|| format!("error parsing {}", path.display()))?
        .iter()
        .map(|der| x509_cert::Certificate::from_der(der))
        .collect::<Result<Vec<_>, _>>()
        .wrap_err_with(|| format!("error parsing {}", path.display()))?;

    if certs.is_empty() {
        eyre::bail!("error parsing {}: no certificates found", path.display());
    }

    Ok(certs)
}

/// Reads a root pool in DER encoding from a PEM file.
pub fn read_root_pool(path: &Path) -> eyre::Result<Vec<Vec<u8>>> {
    let pem = fs::read(path).wrap_err_with(|| format!("error reading {}", path.display()))?;
    let roots = read_pem_chain(&pem).wrap_err_with(|| format!("error parsing {}", path.display()))?;

    if roots.is_empty() {
        eyre::bail!("error parsing {}: no certificates found", path.display());
    }

    Ok(roots)
}

/// Serial number of the certificate in decimal.
pub fn serial_number(cert: &x509_cert::Certificate) -> String {
    num::BigUint::from_bytes_be(cert.tbs_certificate.serial_number.as_bytes()).to_str_radix(10)
}

/// Lowercase hex SHA-256 of the DER encoding.
pub fn sha256_fingerprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

/// Reads a P-256 private key from a PEM file.
///
/// Both PKCS#8 (`PRIVATE KEY`) and SEC1 (`EC PRIVATE KEY`) encodings are accepted.
pub fn read_private_key(path: &Path) -> eyre::Result<p256::SecretKey> {
    let pem = Zeroizing::new(
        fs::read(path).wrap_err_with(|| format!("error reading {}", path.display()))?,
    );
    parse_private_key(&pem).wrap_err_with(|| format!("error parsing {}", path.display()))
}

pub(crate) fn parse_private_key(pem: &[u8]) -> eyre::Result<p256::SecretKey> {
    let mut rdr = BufReader::new(Cursor::new(pem));

    for item in rustls_pemfile::read_all(&mut rdr) {
        match item? {
            rustls_pemfile::Item::Pkcs8Key(key) => {
                return p256::SecretKey::from_pkcs8_der(key.secret_pkcs8_der())
                    .map_err(|err| eyre!("invalid PKCS#8 key: {err}"));
            }
            rustls_pemfile::Item::Sec1Key(key) => {
                return p256::SecretKey::from_sec1_der(key.secret_sec1_der())
                    .map_err(|err| eyre!("invalid SEC1 key: {err}"));
            }
            rustls_pemfile::Item::Pkcs1Key(_) => {
                eyre::bail!("unsupported key type: RSA keys are not supported")
            }
            _ => {}
        }
    }

    Err(eyre!("no private key found"))
}

/// The private key in PKCS#8 PEM format.
pub fn private_key_pem(key: &p256::SecretKey) -> eyre::Result<Zeroizing<String>> {
    key.to_pkcs8_pem(pem::LineEnding::LF)
        .context("error serializing key")
}

/// Returns true if the certificate was issued for the public half of `key`.
pub fn public_key_matches(cert: &x509_cert::Certificate, key: &p256::SecretKey) -> eyre::Result<bool> {
    let cert_spki = cert.tbs_certificate.subject_public_key_info.to_der()?;
    let key_spki = key
        .public_key()
        .to_public_key_der()
        .map_err(|err| eyre!("error encoding public key: {err}"))?;

    Ok(cert_spki == key_spki.as_bytes())
}

/// Checks that `cert` names `issuer` as its issuer and carries its ECDSA P-256 signature.
pub fn verify_issued_by(
    cert: &x509_cert::Certificate,
    issuer: &x509_cert::Certificate,
) -> eyre::Result<()> {
    if cert.tbs_certificate.issuer != issuer.tbs_certificate.subject {
        eyre::bail!(
            "certificate issuer '{}' does not match '{}'",
            cert.tbs_certificate.issuer,
            issuer.tbs_certificate.subject
        );
    }

    if cert.signature_algorithm.oid != ECDSA_WITH_SHA256 {
        eyre::bail!(
            "unsupported certificate signature algorithm {}",
            cert.signature_algorithm.oid
        );
    }

    let issuer_spki = issuer.tbs_certificate.subject_public_key_info.to_der()?;
    let verifying_key = VerifyingKey::from_public_key_der(&issuer_spki)
        .map_err(|err| eyre!("unsupported issuer key: {err}"))?;

    let signature = cert
        .signature
        .as_bytes()
        .ok_or_else(|| eyre!("malformed certificate signature"))?;
    let signature = DerSignature::try_from(signature)
        .map_err(|err| eyre!("malformed certificate signature: {err}"))?;

    let tbs = cert.tbs_certificate.to_der()?;
    verifying_key
        .verify(&tbs, &signature)
        .map_err(|_| eyre!("certificate signature does not verify against its issuer"))
}

/// Checks that the current time lies within the certificate's validity period.
pub fn check_validity(cert: &x509_cert::Certificate) -> eyre::Result<()> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);

    let validity = &cert.tbs_certificate.validity;
    if now < validity.not_before.to_unix_duration() {
        eyre::bail!(
            "certificate is not yet valid (not before {})",
            validity.not_before.to_date_time()
        );
    }
    if now > validity.not_after.to_unix_duration() {
        eyre::bail!(
            "certificate has expired (not after {})",
            validity.not_after.to_date_time()
        );
    }

    Ok(())
}
