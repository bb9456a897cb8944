//! Selection of the CA client a revocation is sent through.

use std::path::PathBuf;

use crate::{
    client::{CaClient, OfflineCa, OnlineCa, RootTrust},
    config::BasePath,
    error::FlagError,
    token::TokenClaims,
    ui,
};

/// The CA a flow talks to, once its local material is loaded.
#[derive(Debug, Clone)]
pub enum CaConnection {
    Offline(OfflineCa),

    Online {
        ca_url: Option<String>,
        root: Option<PathBuf>,
    },
}

/// Returns the client for `connection`.
///
/// For an online CA a bearer token, when given, must have been minted for `serial`. A token that
/// names its CA (URL audience plus root fingerprint) pins the root by fingerprint instead of
/// reading it from disk, and locates the CA when no URL was configured.
pub fn resolve_client(
    connection: &CaConnection,
    serial: &str,
    token: Option<&str>,
    base: &BasePath,
) -> eyre::Result<Box<dyn CaClient>> {
    let (ca_url, root) = match connection {
        CaConnection::Offline(ca) => return Ok(Box::new(ca.clone())),
        CaConnection::Online { ca_url, root } => (ca_url.as_deref(), root.as_deref()),
    };

    if let Some(token) = token {
        let claims = TokenClaims::inspect(token)?;
        claims.check_subject(serial)?;

        if let Some(hint) = claims.ca_hint() {
            let ca_url = ca_url.unwrap_or(&hint.ca_url);
            log::debug!("pinning CA root {} from token", hint.root_fingerprint);

            let client = OnlineCa::new(ca_url, RootTrust::Sha256(hint.root_fingerprint))?;
            ui::print_selected("CA", client.endpoint());
            return Ok(Box::new(client));
        }
    }

    let ca_url = ca_url.ok_or(FlagError::Required {
        command: crate::COMMAND,
        flag: "ca-url",
    })?;

    let root = base.resolve_root(root).ok_or(FlagError::Required {
        command: crate::COMMAND,
        flag: "root",
    })?;

    let client = OnlineCa::new(ca_url, RootTrust::File(root))?;
    ui::print_selected("CA", ca_url);
    Ok(Box::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::{unsigned_token, Pki},
        token::TokenError,
    };

    fn online(ca_url: Option<&str>, root: Option<PathBuf>) -> CaConnection {
        CaConnection::Online {
            ca_url: ca_url.map(str::to_owned),
            root,
        }
    }

    #[test]
    fn online_requires_url_without_token() {
        let pki = Pki::generate();

        let err = resolve_client(&online(None, Some(pki.root_path.clone())), "1", None, &pki.base)
            .err()
            .unwrap();
        assert_eq!(
            err.downcast_ref::<FlagError>(),
            Some(&FlagError::Required { command: crate::COMMAND, flag: "ca-url" })
        );
    }

    #[test]
    fn online_with_url_and_root() {
        let pki = Pki::generate();

        let client = resolve_client(
            &online(Some("https://ca.test:9000"), Some(pki.root_path.clone())),
            "1",
            None,
            &pki.base,
        )
        .unwrap();
        assert_eq!(client.endpoint(), "https://ca.test:9000");
    }

    #[test]
    fn online_default_root() {
        let pki = Pki::generate();
        let conn = online(Some("https://ca.test"), None);

        let err = resolve_client(&conn, "1", None, &pki.base).err().unwrap();
        assert_eq!(
            err.downcast_ref::<FlagError>(),
            Some(&FlagError::Required { command: crate::COMMAND, flag: "root" })
        );

        pki.install_default_root();
        resolve_client(&conn, "1", None, &pki.base).unwrap();
    }

    #[test]
    fn token_locates_ca() {
        let pki = Pki::generate();
        let token = unsigned_token(serde_json::json!({
            "sub": "1",
            "aud": ["https://bootstrap.test/1.0/revoke"],
            "sha": pki.root_fingerprint(),
        }));

        // no local trust material at all
        let client = resolve_client(&online(None, None), "1", Some(&token), &pki.base).unwrap();
        assert_eq!(client.endpoint(), "https://bootstrap.test");
    }

    #[test]
    fn explicit_url_wins_over_token() {
        let pki = Pki::generate();
        let token = unsigned_token(serde_json::json!({
            "sub": "1",
            "aud": ["https://bootstrap.test/1.0/revoke"],
            "sha": pki.root_fingerprint(),
        }));

        // the token's fingerprint stands in for a root file
        let conn = online(Some("https://explicit.test"), None);
        let client = resolve_client(&conn, "1", Some(&token), &pki.base).unwrap();
        assert_eq!(client.endpoint(), "https://explicit.test");
    }

    #[test]
    fn token_without_hint_needs_url() {
        let pki = Pki::generate();
        let token = unsigned_token(serde_json::json!({ "sub": "1", "aud": ["step-ca"] }));

        let err = resolve_client(&online(None, None), "1", Some(&token), &pki.base)
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<FlagError>(),
            Some(FlagError::Required { flag: "ca-url", .. })
        ));
    }

    #[test]
    fn token_subject_must_match() {
        let pki = Pki::generate();
        let token = unsigned_token(serde_json::json!({ "sub": "123" }));
        let conn = online(Some("https://ca.test"), Some(pki.root_path.clone()));

        resolve_client(&conn, "123", Some(&token), &pki.base).unwrap();

        let err = resolve_client(&conn, "456", Some(&token), &pki.base).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<TokenError>(),
            Some(TokenError::SubjectMismatch { .. })
        ));
    }

    #[test]
    fn offline_ignores_flags() {
        let pki = Pki::generate();
        let ca = OfflineCa::load(&pki.ca_config_path).unwrap();

        let client = resolve_client(&CaConnection::Offline(ca), "1", None, &pki.base).unwrap();
        assert_eq!(client.endpoint(), "offline");
    }
}
