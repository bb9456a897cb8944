use std::path::PathBuf;

use ca_revoke::{ui::TerminalPrompter, BasePath, Defaults, RevokeFlags, RevokeFlow};
use clap::Parser;

/// Passively revoke a certificate.
///
/// Revocation is authorized either by the certificate itself, presented over mutual TLS
/// (`--cert` and `--key`), or by a one-time token minted for the certificate's serial number.
/// Passive revocation prevents renewal of the certificate; no CRL or OCSP response is updated.
#[derive(Debug, Parser)]
#[command(name = "ca-revoke", version, verbatim_doc_comment)]
struct Cli {
    /// Serial number of the certificate to revoke, in decimal.
    /// Not allowed with `--cert` and `--key`.
    #[arg(verbatim_doc_comment)]
    serial: Vec<String>,

    /// Certificate to revoke, in PEM format, optionally followed by its chain.
    /// Used as the client certificate of the revocation request.
    #[arg(long, verbatim_doc_comment)]
    cert: Option<PathBuf>,

    /// Private key of `--cert`, in PKCS#8 or SEC1 PEM format.
    #[arg(long)]
    key: Option<PathBuf>,

    /// One-time token authorizing the revocation of the serial number.
    #[arg(long, env = "CA_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Free text explanation of the revocation.
    #[arg(long, default_value = "")]
    reason: String,

    /// Reason code, as a number (0-10) or by name, e.g. `keyCompromise`.
    #[arg(long, default_value = "")]
    reason_code: String,

    /// Revoke against the CA configured on this machine instead of going over the network.
    #[arg(long)]
    offline: bool,

    /// Configuration of the offline CA.
    /// Defaults to `$STEPPATH/config/ca.json`.
    #[arg(long, verbatim_doc_comment)]
    ca_config: Option<PathBuf>,

    /// URL of the online CA.
    #[arg(long, env = "CA_URL")]
    ca_url: Option<String>,

    /// Root certificate of the CA, in PEM format.
    /// Defaults to `$STEPPATH/certs/root_ca.crt`.
    #[arg(long, env = "CA_ROOT", verbatim_doc_comment)]
    root: Option<PathBuf>,

    /// Provisioner signing key used to generate a token when none is given.
    #[arg(long)]
    provisioner_key: Option<PathBuf>,

    /// Name of the provisioner generating the token.
    /// Defaults to the thumbprint of `--provisioner-key`.
    #[arg(long, verbatim_doc_comment)]
    issuer: Option<String>,
}

impl Cli {
    fn into_flags(self, defaults: Defaults) -> (RevokeFlags, Vec<String>) {
        let flags = RevokeFlags {
            cert: self.cert,
            key: self.key,
            token: self.token,
            reason: self.reason,
            reason_code: self.reason_code,
            offline: self.offline,
            ca_config: self.ca_config.or(defaults.ca_config),
            ca_url: self.ca_url.or(defaults.ca_url),
            root: self.root.or(defaults.root),
            provisioner_key: self.provisioner_key,
            issuer: self.issuer,
        };

        (flags, self.serial)
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();

    let base = BasePath::from_env();
    let defaults = Defaults::load(&base.defaults_path())?;
    let (flags, args) = cli.into_flags(defaults);

    let serial = RevokeFlow::new(base, &TerminalPrompter)
        .run(&flags, &args)
        .await?;

    println!("Certificate with Serial Number {serial} has been revoked.");

    Ok(())
}
