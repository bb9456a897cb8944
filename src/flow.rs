//! Revocation flow.
//!
//! A revocation goes through these steps, any of which may fail and end the flow:
//!
//! 1. The reason code is validated, before touching any file or the network.
//! 2. Flags are checked for incompatible or missing combinations.
//! 3. Local material is loaded: the offline CA and its check of the client certificate.
//! 4. The serial number and authorization are resolved, either from a certificate and key pair
//!    (mTLS) or from a serial number and a bearer token, generating the token when needed.
//! 5. The CA client is resolved, see [`resolve_client`].
//! 6. The request is dispatched, over an mTLS transport when no token authorizes it.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::{
    api::RevokeRequest,
    cert::{read_certificate_bundle, serial_number},
    client::OfflineCa,
    config::BasePath,
    error::FlagError,
    provisioner::Provisioner,
    reason::resolve_reason_code,
    resolve::{resolve_client, CaConnection},
    transport::MtlsTransport,
    ui::Prompter,
    COMMAND,
};

const SERIAL_PROMPT: &str =
    "What is the Serial Number of the certificate you would like to revoke? (`ca-revoke --help`)";

/// Flags of a revocation, as given by the user.
///
/// Empty strings are treated like unset flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevokeFlags {
    /// Certificate bundle of the certificate to revoke.
    pub cert: Option<PathBuf>,

    /// Private key of the certificate to revoke.
    pub key: Option<PathBuf>,

    /// Pre-generated bearer token.
    pub token: Option<String>,

    /// Free text reason.
    pub reason: String,

    /// Reason code, as a number or a name.
    pub reason_code: String,

    pub offline: bool,

    /// Offline CA configuration.
    pub ca_config: Option<PathBuf>,

    pub ca_url: Option<String>,

    /// Root certificate of the CA.
    pub root: Option<PathBuf>,

    /// Signing key of the provisioner minting tokens for an online CA.
    pub provisioner_key: Option<PathBuf>,

    /// Name of the provisioner minting tokens for an online CA.
    pub issuer: Option<String>,
}

impl RevokeFlags {
    fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.is_empty())
    }

    fn cert(&self) -> Option<&Path> {
        non_empty_path(self.cert.as_deref())
    }

    fn key(&self) -> Option<&Path> {
        non_empty_path(self.key.as_deref())
    }

    fn ca_url(&self) -> Option<&str> {
        self.ca_url.as_deref().filter(|url| !url.is_empty())
    }

    fn root(&self) -> Option<&Path> {
        non_empty_path(self.root.as_deref())
    }
}

fn non_empty_path(path: Option<&Path>) -> Option<&Path> {
    path.filter(|path| !path.as_os_str().is_empty())
}

/// How a revocation request is authorized.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthorizationMode {
    /// A bearer token minted for the serial number.
    Token(String),

    /// The certificate itself, presented over mutual TLS.
    MutualTls { cert: PathBuf, key: PathBuf },
}

impl AuthorizationMode {
    pub fn token(&self) -> Option<&str> {
        match self {
            AuthorizationMode::Token(token) => Some(token.as_str()),
            AuthorizationMode::MutualTls { .. } => None,
        }
    }
}

// bearer tokens stay out of logs
impl fmt::Debug for AuthorizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorizationMode::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
            AuthorizationMode::MutualTls { cert, key } => f
                .debug_struct("MutualTls")
                .field("cert", cert)
                .field("key", key)
                .finish(),
        }
    }
}

/// Where the CA is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityMode {
    /// CA configured locally.
    Offline(PathBuf),

    /// CA reachable over HTTPS.
    Online {
        ca_url: Option<String>,
        root: Option<PathBuf>,
    },
}

/// What identifies the certificate to revoke.
#[derive(Clone, PartialEq, Eq)]
enum Subject {
    /// Serial number read from the certificate, authorized by the certificate.
    CertKey { cert: PathBuf, key: PathBuf },

    /// Serial number given as argument, authorized by a (possibly generated) token.
    Serial { serial: String, token: Option<String> },
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::CertKey { cert, key } => f
                .debug_struct("CertKey")
                .field("cert", cert)
                .field("key", key)
                .finish(),
            Subject::Serial { serial, token } => f
                .debug_struct("Serial")
                .field("serial", serial)
                .field("token", &token.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

/// Revokes certificates.
pub struct RevokeFlow<'a> {
    base: BasePath,
    prompter: &'a dyn Prompter,
}

impl<'a> RevokeFlow<'a> {
    pub fn new(base: BasePath, prompter: &'a dyn Prompter) -> Self {
        RevokeFlow { base, prompter }
    }

    /// Passively revokes a certificate and returns its serial number.
    ///
    /// `args` are the positional arguments: the serial number, unless `--cert` and `--key` are
    /// given.
    pub async fn run(&self, flags: &RevokeFlags, args: &[String]) -> eyre::Result<String> {
        let reason_code = resolve_reason_code(&flags.reason_code)?;
        log::trace!("reason code {reason_code}");

        // a token is minted for an online CA's provisioner
        if flags.offline && flags.token().is_some() {
            return Err(FlagError::Incompatible {
                flag: "offline",
                other: "token",
            }
            .into());
        }

        let subject = check_subject_flags(flags, args)?;
        let mode = self.connectivity(flags)?;
        log::debug!("resolved input mode: {subject:?}, {mode:?}");

        let connection = match mode {
            ConnectivityMode::Offline(ca_config) => {
                let ca = OfflineCa::load(&ca_config)?;
                if let Subject::CertKey { cert, key } = &subject {
                    ca.verify_client_cert(cert, key)?;
                }
                CaConnection::Offline(ca)
            }
            ConnectivityMode::Online { ca_url, root } => CaConnection::Online { ca_url, root },
        };

        let (serial, authorization) = match subject {
            Subject::CertKey { cert, key } => {
                let bundle = read_certificate_bundle(&cert)?;
                let serial = serial_number(&bundle[0]);
                log::debug!("serial number {serial} read from {}", cert.display());

                (serial, AuthorizationMode::MutualTls { cert, key })
            }

            Subject::Serial { mut serial, token } => {
                let token = match token {
                    Some(token) => token,
                    None => self.generate_token(&connection, flags, &mut serial)?,
                };

                (serial, AuthorizationMode::Token(token))
            }
        };

        let client = resolve_client(&connection, &serial, authorization.token(), &self.base)?;

        let transport = match &authorization {
            AuthorizationMode::MutualTls { cert, key } => {
                let root = match (&connection, flags.root()) {
                    (CaConnection::Offline(ca), None) => Some(ca.config().root.as_path()),
                    (_, root) => root,
                };
                Some(MtlsTransport::build(cert, key, root, &self.base)?)
            }
            AuthorizationMode::Token(_) => None,
        };

        let req = RevokeRequest::new(
            serial,
            reason_code,
            flags.reason.clone(),
            authorization.token().map(str::to_owned),
        );

        log::debug!("revoking {} at {}", req.serial, client.endpoint());
        client.revoke(&req, transport.as_ref()).await?;

        Ok(req.serial)
    }

    fn connectivity(&self, flags: &RevokeFlags) -> eyre::Result<ConnectivityMode> {
        if !flags.offline {
            return Ok(ConnectivityMode::Online {
                ca_url: flags.ca_url().map(str::to_owned),
                root: flags.root().map(Path::to_path_buf),
            });
        }

        let ca_config = match non_empty_path(flags.ca_config.as_deref()) {
            Some(path) => path.to_path_buf(),
            None => Some(self.base.ca_config_path())
                .filter(|path| path.exists())
                .ok_or(FlagError::Required {
                    command: COMMAND,
                    flag: "ca-config",
                })?,
        };

        Ok(ConnectivityMode::Offline(ca_config))
    }

    /// Mints a token for `serial`, prompting for the serial number if it is still unknown.
    fn generate_token(
        &self,
        connection: &CaConnection,
        flags: &RevokeFlags,
        serial: &mut String,
    ) -> eyre::Result<String> {
        match connection {
            CaConnection::Offline(ca) => {
                self.ensure_serial(serial)?;
                ca.generate_token(serial)
            }

            CaConnection::Online { ca_url, root } => {
                let ca_url = ca_url.as_deref().ok_or(FlagError::RequiredUnless {
                    command: COMMAND,
                    flag: "ca-url",
                    unless: "token",
                })?;
                let root = self
                    .base
                    .resolve_root(root.as_deref())
                    .ok_or(FlagError::RequiredUnless {
                        command: COMMAND,
                        flag: "root",
                        unless: "token",
                    })?;
                let key_path =
                    non_empty_path(flags.provisioner_key.as_deref()).ok_or(FlagError::RequiredUnless {
                        command: COMMAND,
                        flag: "provisioner-key",
                        unless: "token",
                    })?;

                self.ensure_serial(serial)?;

                let provisioner = Provisioner::load(key_path, flags.issuer.clone())?;
                log::debug!("generating token with provisioner '{}'", provisioner.name());
                provisioner.revoke_token(serial, ca_url, &root)
            }
        }
    }

    fn ensure_serial(&self, serial: &mut String) -> eyre::Result<()> {
        if serial.is_empty() {
            *serial = self.prompter.prompt_non_empty(SERIAL_PROMPT)?;
        }
        Ok(())
    }
}

/// Checks which of cert/key or serial/token identify the certificate.
fn check_subject_flags(flags: &RevokeFlags, args: &[String]) -> Result<Subject, FlagError> {
    if flags.cert().is_some() || flags.key().is_some() {
        // the serial number comes from the certificate
        if !args.is_empty() {
            return Err(FlagError::UnexpectedArguments { command: COMMAND });
        }

        let cert = flags.cert().ok_or(FlagError::RequiredWith {
            flag: "cert",
            with: "key",
        })?;
        let key = flags.key().ok_or(FlagError::RequiredWith {
            flag: "key",
            with: "cert",
        })?;

        if flags.token().is_some() {
            return Err(FlagError::Incompatible {
                flag: "cert",
                other: "token",
            });
        }

        return Ok(Subject::CertKey {
            cert: cert.to_path_buf(),
            key: key.to_path_buf(),
        });
    }

    if args.len() != 1 {
        return Err(FlagError::ArgumentCount {
            command: COMMAND,
            expected: 1,
            got: args.len(),
        });
    }

    Ok(Subject::Serial {
        serial: args[0].clone(),
        token: flags.token().map(str::to_owned),
    })
}
