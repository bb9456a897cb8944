use std::{
    any::Any,
    fs,
    net::TcpListener,
    path::{Path, PathBuf},
    sync::Arc,
};

use actix_server::ServerHandle;
use actix_tls::accept::rustls_0_23::TlsStream;
use actix_web::{
    dev::Extensions, rt::net::TcpStream, web, App, HttpRequest, HttpResponse, HttpServer,
};
use base64::prelude::*;
use der::Decode as _;
use p256::pkcs8::DecodePrivateKey as _;
use parking_lot::Mutex;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, SerialNumber, PKCS_ECDSA_P256_SHA256,
};
use rustls::{
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
    server::WebPkiClientVerifier,
    RootCertStore, ServerConfig,
};

use crate::{
    api::RevokeRequest,
    cert::{serial_number, sha256_fingerprint},
    config::BasePath,
    ui::Prompter,
};

/// Serial number the mock CA reports as already revoked.
pub const ALREADY_REVOKED_SERIAL: &str = "409";

/// Root fingerprint for which the mock CA serves a certificate that does not hash to it.
pub const MISMATCHED_ROOT_SHA: &str =
    "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";

/// Throwaway PKI: root, intermediate, a leaf issued by the intermediate and a provisioner key.
pub struct Pki {
    pub base: BasePath,
    pub root_path: PathBuf,
    pub intermediate_cert_path: PathBuf,
    pub intermediate_key_path: PathBuf,

    /// Leaf followed by the intermediate.
    pub leaf_cert_path: PathBuf,
    pub leaf_key_path: PathBuf,
    pub leaf_sec1_key_path: PathBuf,

    pub provisioner_key_path: PathBuf,

    /// Offline CA configuration, with paths relative to its own directory.
    pub ca_config_path: PathBuf,

    root_pem: String,
    root_der: Vec<u8>,
    intermediate_pem: String,

    /// TLS certificate of the mock CA for 127.0.0.1, followed by the intermediate.
    server_chain: Vec<Vec<u8>>,
    server_key: Vec<u8>,

    _dir: tempfile::TempDir,
}

impl Pki {
    /// Decimal serial number of the leaf.
    pub const LEAF_SERIAL: &'static str = "258";

    pub fn generate() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pki_dir = dir.path().join("pki");
        fs::create_dir_all(&pki_dir).unwrap();

        let root_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let mut root_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        root_params.distinguished_name = named("Test Root CA");
        root_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let root = root_params.self_signed(&root_key).unwrap();

        let intermediate_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let mut intermediate_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        intermediate_params.distinguished_name = named("Test Intermediate CA");
        intermediate_params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
        let intermediate = intermediate_params
            .signed_by(&intermediate_key, &root, &root_key)
            .unwrap();

        let leaf_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let mut leaf_params = CertificateParams::new(vec!["client.test".to_owned()]).unwrap();
        leaf_params.distinguished_name = named("client.test");
        leaf_params.serial_number = Some(SerialNumber::from_slice(&[0x01, 0x02]));
        leaf_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let leaf = leaf_params
            .signed_by(&leaf_key, &intermediate, &intermediate_key)
            .unwrap();

        let server_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let mut server_params = CertificateParams::new(vec!["127.0.0.1".to_owned()]).unwrap();
        server_params.distinguished_name = named("Test CA server");
        server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let server = server_params
            .signed_by(&server_key, &intermediate, &intermediate_key)
            .unwrap();

        let leaf_sec1 = p256::SecretKey::from_pkcs8_der(&leaf_key.serialize_der())
            .unwrap()
            .to_sec1_pem(pem::LineEnding::LF)
            .unwrap();

        let provisioner_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();

        let write = |name: &str, contents: &str| {
            let path = pki_dir.join(name);
            fs::write(&path, contents).unwrap();
            path
        };

        let root_path = write("root_ca.crt", &root.pem());
        let intermediate_cert_path = write("intermediate_ca.crt", &intermediate.pem());
        let intermediate_key_path = write("intermediate_ca.key", &intermediate_key.serialize_pem());
        let leaf_cert_path = write(
            "client.crt",
            &format!("{}{}", leaf.pem(), intermediate.pem()),
        );
        let leaf_key_path = write("client.key", &leaf_key.serialize_pem());
        let leaf_sec1_key_path = write("client.sec1.key", &leaf_sec1);
        let provisioner_key_path = write("provisioner.key", &provisioner_key.serialize_pem());

        let ca_config = serde_json::json!({
            "root": "root_ca.crt",
            "crt": "intermediate_ca.crt",
            "address": ":9000",
            "dnsNames": ["ca.test"],
            "provisioner": {
                "name": "admin",
                "key": "provisioner.key",
            },
            "db": {
                "type": "json",
                "dataSource": "db/revoked.json",
            },
        });
        let ca_config_path = write("ca.json", &ca_config.to_string());

        Pki {
            base: BasePath::new(dir.path().join("step")),
            root_path,
            intermediate_cert_path,
            intermediate_key_path,
            leaf_cert_path,
            leaf_key_path,
            leaf_sec1_key_path,
            provisioner_key_path,
            ca_config_path,
            root_pem: root.pem(),
            root_der: root.der().to_vec(),
            intermediate_pem: intermediate.pem(),
            server_chain: vec![server.der().to_vec(), intermediate.der().to_vec()],
            server_key: server_key.serialize_der(),
            _dir: dir,
        }
    }

    pub fn root_fingerprint(&self) -> String {
        sha256_fingerprint(&self.root_der)
    }

    /// Copies the root to the default root location of the base path.
    pub fn install_default_root(&self) {
        install(&self.root_path, &self.base.root_ca_path());
    }

    /// Writes the offline CA configuration to the default location of the base path.
    pub fn install_default_ca_config(&self) {
        let dir = self.ca_config_path.parent().unwrap();

        let mut config = serde_json::from_slice::<serde_json::Value>(
            &fs::read(&self.ca_config_path).unwrap(),
        )
        .unwrap();
        for file in ["/root", "/crt", "/provisioner/key", "/db/dataSource"] {
            let value = config.pointer_mut(file).unwrap();
            let abs = dir.join(value.as_str().unwrap());
            *value = abs.to_str().unwrap().into();
        }

        let dst = self.base.ca_config_path();
        fs::create_dir_all(dst.parent().unwrap()).unwrap();
        fs::write(dst, config.to_string()).unwrap();
    }

    /// TLS configuration of the mock CA: its own chain, and client certificates optionally
    /// verified against the root.
    fn server_config(&self) -> ServerConfig {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

        let mut client_auth_roots = RootCertStore::empty();
        client_auth_roots
            .add(CertificateDer::from(self.root_der.clone()))
            .unwrap();
        let client_auth =
            WebPkiClientVerifier::builder_with_provider(client_auth_roots.into(), provider.clone())
                .allow_unauthenticated()
                .build()
                .unwrap();

        let chain = self
            .server_chain
            .iter()
            .map(|der| CertificateDer::from(der.clone()))
            .collect();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.server_key.clone()));

        ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_client_cert_verifier(client_auth)
            .with_single_cert(chain, key)
            .unwrap()
    }
}

fn named(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn
}

fn install(src: &Path, dst: &Path) {
    fs::create_dir_all(dst.parent().unwrap()).unwrap();
    fs::copy(src, dst).unwrap();
}

/// Encodes `claims` as a token with a bogus signature.
pub fn unsigned_token(claims: serde_json::Value) -> String {
    let header = BASE64_URL_SAFE_NO_PAD.encode(r#"{"alg":"ES256","typ":"JWT"}"#);
    let payload = BASE64_URL_SAFE_NO_PAD.encode(claims.to_string());
    let signature = BASE64_URL_SAFE_NO_PAD.encode("not a signature");

    format!("{header}.{payload}.{signature}")
}

/// Answers every prompt with the same value.
pub struct FixedPrompter(pub &'static str);

impl Prompter for FixedPrompter {
    fn prompt_non_empty(&self, _question: &str) -> eyre::Result<String> {
        Ok(self.0.to_owned())
    }
}

/// Fails on any prompt.
pub struct NoPrompt;

pub const NO_PROMPT: NoPrompt = NoPrompt;

impl Prompter for NoPrompt {
    fn prompt_non_empty(&self, question: &str) -> eyre::Result<String> {
        panic!("unexpected prompt: {question}");
    }
}

/// A revocation accepted by the mock CA.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub request: RevokeRequest,

    /// Serial number of the client certificate the connection was authenticated with.
    pub client_serial: Option<String>,
}

/// Client certificate of a TLS connection.
#[derive(Debug, Clone)]
struct PeerCertificate {
    serial: String,
}

struct CaState {
    root_pem: String,
    root_fingerprint: String,
    intermediate_pem: String,
    accepted: Mutex<Vec<Accepted>>,
}

/// Mock online CA, served over TLS with optional client authentication.
pub struct TestServer {
    pub url: String,
    state: web::Data<CaState>,
    handle: ServerHandle,
}

impl TestServer {
    /// Requests accepted so far.
    pub fn revoked(&self) -> Vec<RevokeRequest> {
        self.accepted().into_iter().map(|acc| acc.request).collect()
    }

    pub fn accepted(&self) -> Vec<Accepted> {
        self.state.accepted.lock().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        drop(self.handle.stop(false));
    }
}

fn extract_peer_certificate(conn: &dyn Any, ext: &mut Extensions) {
    let Some(tls) = conn.downcast_ref::<TlsStream<TcpStream>>() else {
        return;
    };

    let (_, session) = tls.get_ref();
    let leaf = session
        .peer_certificates()
        .and_then(|certs| certs.first())
        .and_then(|der| x509_cert::Certificate::from_der(der).ok());

    if let Some(leaf) = leaf {
        ext.insert(PeerCertificate {
            serial: serial_number(&leaf),
        });
    }
}

async fn post_revoke(
    state: web::Data<CaState>,
    http_req: HttpRequest,
    req: web::Json<RevokeRequest>,
) -> HttpResponse {
    let client_serial = http_req
        .conn_data::<PeerCertificate>()
        .map(|peer| peer.serial.clone());

    if !req.has_token() && client_serial.as_deref() != Some(req.serial.as_str()) {
        return HttpResponse::Unauthorized().json(serde_json::json!({
            "status": 401,
            "message": "missing client certificate for serial number",
        }));
    }

    if req.serial == ALREADY_REVOKED_SERIAL {
        return HttpResponse::Conflict().json(serde_json::json!({
            "status": 409,
            "message": "certificate already revoked",
        }));
    }

    state.accepted.lock().push(Accepted {
        request: req.into_inner(),
        client_serial,
    });
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

async fn get_root(state: web::Data<CaState>, sha: web::Path<String>) -> HttpResponse {
    if *sha == MISMATCHED_ROOT_SHA {
        return HttpResponse::Ok().json(serde_json::json!({ "ca": state.intermediate_pem }));
    }

    if *sha != state.root_fingerprint {
        return HttpResponse::NotFound().json(serde_json::json!({
            "status": 404,
            "message": "root not found",
        }));
    }

    HttpResponse::Ok().json(serde_json::json!({ "ca": state.root_pem }))
}

/// Starts a mock CA whose TLS certificate chains to the root of `pki`.
///
/// Must be called from within a Tokio runtime.
pub fn with_ca_server(pki: &Pki) -> TestServer {
    let lst = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = lst.local_addr().unwrap().port();
    let url = format!("https://127.0.0.1:{port}");

    let state = web::Data::new(CaState {
        root_pem: pki.root_pem.clone(),
        root_fingerprint: pki.root_fingerprint(),
        intermediate_pem: pki.intermediate_pem.clone(),
        accepted: Mutex::new(Vec::new()),
    });

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .route("/1.0/revoke", web::post().to(post_revoke))
            .route("/root/{sha}", web::get().to(get_root))
    })
    .on_connect(extract_peer_certificate)
    .workers(1)
    .listen_rustls_0_23(lst, pki.server_config())
    .unwrap()
    .run();

    let handle = server.handle();

    tokio::spawn(server);

    TestServer { url, state, handle }
}

#[tokio::test]
pub async fn test_mock_ca_serves_root() {
    let pki = Pki::generate();
    let server = with_ca_server(&pki);

    let client = reqwest::Client::builder()
        .use_rustls_tls()
        .tls_built_in_root_certs(false)
        .add_root_certificate(reqwest::Certificate::from_pem(pki.root_pem.as_bytes()).unwrap())
        .build()
        .unwrap();

    let url = format!("{}/root/{}", server.url, pki.root_fingerprint());
    let res = client.get(&url).send().await.unwrap();
    assert!(res.status().is_success());

    let res = client
        .get(format!("{}/root/00", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 404);
}

#[tokio::test]
pub async fn test_mock_ca_requires_client_certificate() {
    let pki = Pki::generate();
    let server = with_ca_server(&pki);

    let client = reqwest::Client::builder()
        .use_rustls_tls()
        .tls_built_in_root_certs(false)
        .add_root_certificate(reqwest::Certificate::from_pem(pki.root_pem.as_bytes()).unwrap())
        .build()
        .unwrap();

    let req = RevokeRequest::new(Pki::LEAF_SERIAL.to_owned(), 0, String::new(), None);
    let res = client
        .post(format!("{}/1.0/revoke", server.url))
        .json(&req)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 401);
    assert!(server.revoked().is_empty());
}
