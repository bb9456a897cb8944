//! Passive revocation of X.509 certificates issued by an online or offline certificate authority.
//!
//! A passive revocation only marks a certificate as revoked in the CA's database so that it can no
//! longer be renewed; no CRL or OCSP responder is updated.
//!
//! # Usage
//!
//! Revocations are driven by a [`RevokeFlow`], configured from [`RevokeFlags`]. The request can be
//! authorized in one of two ways:
//!
//! - by the certificate itself, presented as the client certificate of a mutual TLS connection
//!   (`--cert` and `--key`); the serial number is read from the certificate;
//! - by a one-time bearer token minted for the certificate's serial number, either given with
//!   `--token` or generated on the fly from a provisioner key.
//!
//! # Locating the CA
//!
//! An online CA is located by its URL and trusted through a root certificate file. A token that
//! carries both the CA URL (as its audience) and the root's SHA-256 fingerprint is enough on its
//! own: the root is then downloaded from the CA and checked against the fingerprint.
//!
//! With `--offline`, the CA is loaded from its configuration file and the request is authorized
//! in-process. See [`OfflineCa`].
//!
//! # Reason Codes
//!
//! Reason codes follow [RFC 5280 §5.3.1] and are given either as a number or by name, see
//! [`resolve_reason_code`].
//!
//! [RFC 5280 §5.3.1]: https://datatracker.ietf.org/doc/html/rfc5280#section-5.3.1

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

mod cert;
mod error;
mod jws;
mod provisioner;
mod reason;
mod resolve;
mod token;
mod transport;

pub mod api;
pub mod client;
pub mod config;
pub mod flow;
pub mod ui;

#[cfg(test)]
mod test;

/// Name of the command, as shown in usage errors.
pub const COMMAND: &str = "ca-revoke";

pub use crate::{
    client::{CaClient, OfflineCa, OfflineCaConfig, OnlineCa, RootTrust},
    config::{BasePath, Defaults},
    error::FlagError,
    flow::{AuthorizationMode, ConnectivityMode, RevokeFlags, RevokeFlow},
    provisioner::Provisioner,
    reason::{resolve_reason_code, ReasonCodeError, RevocationReason},
    resolve::{resolve_client, CaConnection},
    token::{TokenBuilder, TokenClaims, TokenError},
    transport::{KeyPairError, MtlsTransport},
};
