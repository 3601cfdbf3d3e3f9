//! 測試用的假 CA、時鐘與 DNS 佈建器。

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    fs,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, OnceLock},
    time::Duration,
};

use openssl::{
    bn::BigNum,
    hash::MessageDigest,
    nid::Nid,
    pkey::PKey,
    rsa::Rsa,
    sign::Verifier,
    stack::Stack,
    x509::{extension::SubjectAlternativeName, X509NameBuilder, X509ReqBuilder},
};
use log::{LevelFilter, Log, Metadata, Record};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};

use crate::{
    base64,
    error::{Result, BAD_NONCE_URN},
    key_pair::AccountKey,
    poll::Clock,
    responder::{DnsChallengeRecord, DnsProvisioner},
    signature::Signer,
    transport::{HttpClient, HttpRequest, HttpResponse, Method},
};

pub const DIRECTORY_URL: &str = "https://ca.test/directory";
pub const HTTP_TOKEN: &str = "http-token_1";
pub const DNS_TOKEN: &str = "dns-token_1";
pub const CERTIFICATE_PEM: &str =
    "-----BEGIN CERTIFICATE-----\nMIIBfake\n-----END CERTIFICATE-----\n";

const CA: &str = "https://ca.test";

/// 所有測試共用的帳戶金鑰。
pub fn test_key() -> Arc<AccountKey> {
    static KEY: OnceLock<Arc<AccountKey>> = OnceLock::new();
    KEY.get_or_init(|| Arc::new(AccountKey::generate(Some(2048)).unwrap()))
        .clone()
}

/// 以共用金鑰建立 PEM 格式的 CSR。
pub fn build_csr(common_name: Option<&str>, sans: &[&str]) -> Vec<u8> {
    let pkey = PKey::private_key_from_pem(&test_key().to_pem().unwrap()).unwrap();
    let mut builder = X509ReqBuilder::new().unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    match common_name {
        Some(cn) => name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap(),
        None => name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "No CN").unwrap(),
    }
    builder.set_subject_name(&name.build()).unwrap();

    if !sans.is_empty() {
        let mut san = SubjectAlternativeName::new();
        for dns in sans {
            san.dns(dns);
        }
        let extension = san.build(&builder.x509v3_context(None)).unwrap();
        let mut extensions = Stack::new().unwrap();
        extensions.push(extension).unwrap();
        builder.add_extensions(&extensions).unwrap();
    }

    builder.set_pubkey(&pkey).unwrap();
    builder.sign(&pkey, MessageDigest::sha256()).unwrap();
    builder.build().to_pem().unwrap()
}

thread_local! {
    static CAPTURED_LOGS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// 將目前執行緒的 info 以上日誌收集到記憶體。
struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        CAPTURED_LOGS.with(|logs| logs.borrow_mut().push(record.args().to_string()));
    }

    fn flush(&self) {}
}

/// 開始收集目前執行緒的日誌，並清除先前收集的內容。
pub fn capture_logs() {
    static LOGGER: CaptureLogger = CaptureLogger;
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Info);
        }
    });
    CAPTURED_LOGS.with(|logs| logs.borrow_mut().clear());
}

pub fn captured_logs() -> Vec<String> {
    CAPTURED_LOGS.with(|logs| logs.borrow().clone())
}

/// 跨元件記錄事件順序。
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// 第一個符合 `entry` 的位置。
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

/// 只推進模擬時間的時鐘。
#[derive(Debug, Default)]
pub struct FakeClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
    journal: Option<Journal>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal: Some(journal),
            ..Self::default()
        }
    }

    pub fn elapsed(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
        self.sleeps.lock().unwrap().push(duration);
        if let Some(journal) = &self.journal {
            journal.push(format!("sleep {}s", duration.as_secs()));
        }
    }
}

/// 只記錄呼叫的 DNS 佈建器。
#[derive(Debug, Default)]
pub struct RecordingProvisioner {
    journal: Journal,
    records: Arc<Mutex<Vec<DnsChallengeRecord>>>,
    fail_removal: bool,
}

impl RecordingProvisioner {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    pub fn failing_removal(mut self) -> Self {
        self.fail_removal = true;
        self
    }

    pub fn records(&self) -> Arc<Mutex<Vec<DnsChallengeRecord>>> {
        self.records.clone()
    }
}

impl DnsProvisioner for RecordingProvisioner {
    fn add_txt(&self, record: &DnsChallengeRecord) -> Result<()> {
        self.journal.push(format!("add {}", record.domain));
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn remove_txt(&self, record: &DnsChallengeRecord) -> Result<()> {
        self.journal.push(format!("rm {}", record.domain));
        if self.fail_removal {
            return Err(crate::error::Error::DnsApi {
                action: "rm".into(),
                domain: record.domain.clone(),
                reason: "provider unavailable".into(),
            });
        }
        Ok(())
    }
}

/// 假 CA 收到的一個簽名請求。
#[derive(Debug, Clone)]
pub struct SignedRecord {
    pub url: String,
    pub protected: Value,
    pub payload: String,
    pub signature_valid: bool,
}

impl SignedRecord {
    pub fn payload_json(&self) -> Value {
        let bytes = base64::decode(&self.payload).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

#[derive(Debug, Default)]
struct AuthzState {
    domain: String,
    notified: bool,
    pending_polls: u32,
}

/// 假 CA 的狀態與可調整的行為。
#[derive(Debug)]
pub struct FakeState {
    pub signed: Vec<SignedRecord>,
    pub nonce_fetches: usize,
    pub nonce_reused: bool,
    /// 接下來以 badNonce 拒絕的次數，`u32::MAX` 代表永遠拒絕。
    pub bad_nonce_budget: u32,
    pub account_exists: bool,
    pub omit_account_location: bool,
    pub offered_challenges: Vec<&'static str>,
    pub auth_initial_status: &'static str,
    pub auth_final_status: &'static str,
    /// 通知後仍回報 pending 的輪詢次數。
    pub pending_polls: u32,
    pub order_final_status: &'static str,
    pub webroot: Option<PathBuf>,
    pub self_check_body: Option<String>,
    /// 收到挑戰通知時網站根目錄中的驗證檔內容。
    pub served_at_notify: Option<String>,
    pub journal: Journal,
    issued_nonces: HashSet<String>,
    nonce_counter: u64,
    authorizations: HashMap<usize, AuthzState>,
    finalized: bool,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            signed: Vec::new(),
            nonce_fetches: 0,
            nonce_reused: false,
            bad_nonce_budget: 0,
            account_exists: false,
            omit_account_location: false,
            offered_challenges: vec!["http-01", "dns-01"],
            auth_initial_status: "pending",
            auth_final_status: "valid",
            pending_polls: 1,
            order_final_status: "valid",
            webroot: None,
            self_check_body: None,
            served_at_notify: None,
            journal: Journal::default(),
            issued_nonces: HashSet::new(),
            nonce_counter: 0,
            authorizations: HashMap::new(),
            finalized: false,
        }
    }
}

/// 在記憶體中模擬 `https://ca.test` 的 ACME 伺服器，以及網域上的 HTTP-01 自我檢查。
#[derive(Debug, Default)]
pub struct FakeCa {
    state: Mutex<FakeState>,
}

impl FakeCa {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

impl HttpClient for FakeCa {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut state = self.state();
        let response = match request.method {
            Method::Get => state.get(&request.url),
            Method::Head => state.head(&request.url),
            Method::Post => state.post(&request.url, request.body.as_deref().unwrap_or("")),
        };
        Ok(response)
    }
}

fn respond(status: u16, body: Value) -> HttpResponse {
    HttpResponse {
        status,
        headers: HeaderMap::new(),
        body: body.to_string().into_bytes(),
    }
}

fn not_found(url: &str) -> HttpResponse {
    respond(
        404,
        json!({"type": "urn:ietf:params:acme:error:malformed", "detail": format!("{} not found", url)}),
    )
}

fn with_header(mut response: HttpResponse, name: &'static str, value: &str) -> HttpResponse {
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers.insert(name, value);
    }
    response
}

impl FakeState {
    fn fresh_nonce(&mut self) -> String {
        self.nonce_counter += 1;
        let nonce = format!("nonce-{}", self.nonce_counter);
        self.issued_nonces.insert(nonce.clone());
        nonce
    }

    fn get(&mut self, url: &str) -> HttpResponse {
        if url == DIRECTORY_URL {
            return respond(
                200,
                json!({
                    "newNonce": format!("{}/new-nonce", CA),
                    "newAccount": format!("{}/new-account", CA),
                    "newOrder": format!("{}/new-order", CA),
                    "revokeCert": format!("{}/revoke-cert", CA),
                    "keyChange": format!("{}/key-change", CA),
                    "meta": {"termsOfService": format!("{}/terms", CA)}
                }),
            );
        }
        if url == format!("{}/not-a-directory", CA) {
            return respond(200, json!({"hello": "world"}));
        }
        if let Some((_, token)) = url
            .strip_prefix("http://")
            .and_then(|rest| rest.split_once("/.well-known/acme-challenge/"))
        {
            return self.serve_challenge_file(token);
        }
        not_found(url)
    }

    fn serve_challenge_file(&self, token: &str) -> HttpResponse {
        if let Some(body) = &self.self_check_body {
            return HttpResponse {
                status: 200,
                headers: HeaderMap::new(),
                body: body.clone().into_bytes(),
            };
        }
        match self
            .webroot
            .as_ref()
            .and_then(|root| fs::read(root.join(token)).ok())
        {
            Some(body) => HttpResponse {
                status: 200,
                headers: HeaderMap::new(),
                body,
            },
            None => not_found(token),
        }
    }

    fn head(&mut self, url: &str) -> HttpResponse {
        if url == format!("{}/new-nonce", CA) {
            self.nonce_fetches += 1;
            let nonce = self.fresh_nonce();
            return with_header(respond(200, Value::Null), "replay-nonce", &nonce);
        }
        HttpResponse {
            status: 200,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    fn post(&mut self, url: &str, body: &str) -> HttpResponse {
        let jws: Value = serde_json::from_str(body).unwrap_or_default();
        let protected64 = jws["protected"].as_str().unwrap_or_default().to_owned();
        let payload64 = jws["payload"].as_str().unwrap_or_default().to_owned();
        let signature64 = jws["signature"].as_str().unwrap_or_default();
        let protected: Value = base64::decode(&protected64)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();

        let signature_valid = verify_signature(&protected64, &payload64, signature64);
        self.signed.push(SignedRecord {
            url: url.to_owned(),
            protected: protected.clone(),
            payload: payload64.clone(),
            signature_valid,
        });

        let nonce = protected["nonce"].as_str().unwrap_or_default().to_owned();
        let nonce_ok = self.issued_nonces.remove(&nonce);
        if !nonce_ok {
            self.nonce_reused = true;
        }
        let response = if !nonce_ok || self.bad_nonce_budget > 0 {
            if self.bad_nonce_budget != u32::MAX && nonce_ok {
                self.bad_nonce_budget -= 1;
            }
            respond(
                400,
                json!({"type": BAD_NONCE_URN, "detail": "JWS has an invalid anti-replay nonce"}),
            )
        } else if !signature_valid || protected["url"] != url {
            respond(
                400,
                json!({"type": "urn:ietf:params:acme:error:malformed", "detail": "bad JWS"}),
            )
        } else {
            let payload = base64::decode(&payload64)
                .ok()
                .and_then(|bytes| serde_json::from_slice(&bytes).ok());
            self.route(url, payload)
        };

        let nonce = self.fresh_nonce();
        with_header(response, "replay-nonce", &nonce)
    }

    fn route(&mut self, url: &str, payload: Option<Value>) -> HttpResponse {
        let path = url.strip_prefix(CA).unwrap_or_default();
        let account_url = format!("{}/acct/1", CA);
        let order_url = format!("{}/order/1", CA);

        match path {
            "/new-account" => {
                let status = if self.account_exists { 200 } else { 201 };
                let response = respond(status, json!({"status": "valid", "contact": []}));
                if self.omit_account_location {
                    response
                } else {
                    with_header(response, "location", &account_url)
                }
            }
            "/acct/1" => {
                let contact = payload
                    .as_ref()
                    .and_then(|p| p.get("contact").cloned())
                    .unwrap_or_else(|| json!([]));
                respond(200, json!({"status": "valid", "contact": contact}))
            }
            "/new-order" => {
                let identifiers = payload
                    .as_ref()
                    .and_then(|p| p.get("identifiers").cloned())
                    .unwrap_or_else(|| json!([]));
                self.authorizations.clear();
                self.finalized = false;
                for (i, identifier) in identifiers.as_array().into_iter().flatten().enumerate() {
                    self.authorizations.insert(
                        i + 1,
                        AuthzState {
                            domain: identifier["value"].as_str().unwrap_or_default().to_owned(),
                            ..AuthzState::default()
                        },
                    );
                }
                with_header(respond(201, self.order_json()), "location", &order_url)
            }
            "/order/1" if payload.is_none() => respond(200, self.order_json()),
            "/order/1/finalize" => {
                self.finalized = true;
                let mut order = self.order_json();
                order["status"] = json!("processing");
                respond(200, order)
            }
            "/cert/1" if payload.is_none() => HttpResponse {
                status: 200,
                headers: HeaderMap::new(),
                body: CERTIFICATE_PEM.as_bytes().to_vec(),
            },
            _ => {
                if let Some(id) = path.strip_prefix("/authz/").and_then(|id| id.parse().ok()) {
                    if payload.is_none() {
                        return self.poll_authorization(id, url);
                    }
                }
                if let Some(id) = path.strip_prefix("/chall/").and_then(|id| id.parse().ok()) {
                    if payload == Some(json!({})) {
                        return self.notify(id, url);
                    }
                }
                not_found(url)
            }
        }
    }

    fn order_json(&self) -> Value {
        let mut ids: Vec<_> = self.authorizations.keys().copied().collect();
        ids.sort_unstable();
        let all_valid = ids.iter().all(|id| self.authorization_status(*id) == "valid");
        let status = match (self.finalized, all_valid) {
            (true, _) => self.order_final_status,
            (false, true) => "ready",
            (false, false) => "pending",
        };
        let mut order = json!({
            "status": status,
            "expires": "2026-10-23T00:00:00Z",
            "identifiers": ids
                .iter()
                .map(|id| json!({"type": "dns", "value": self.authorizations[id].domain}))
                .collect::<Vec<_>>(),
            "authorizations": ids
                .iter()
                .map(|id| format!("{}/authz/{}", CA, id))
                .collect::<Vec<_>>(),
            "finalize": format!("{}/order/1/finalize", CA),
        });
        if status == "valid" {
            order["certificate"] = json!(format!("{}/cert/1", CA));
        }
        if status == "invalid" {
            order["error"] = json!({
                "type": "urn:ietf:params:acme:error:badCSR",
                "detail": "CSR rejected"
            });
        }
        order
    }

    fn authorization_status(&self, id: usize) -> &'static str {
        match self.authorizations.get(&id) {
            Some(authz) if authz.notified => self.auth_final_status,
            Some(_) => self.auth_initial_status,
            None => "invalid",
        }
    }

    fn authorization_json(&self, id: usize, status: &str) -> Value {
        let domain = self
            .authorizations
            .get(&id)
            .map(|a| a.domain.clone())
            .unwrap_or_default();
        let challenges: Vec<Value> = self
            .offered_challenges
            .iter()
            .map(|kind| {
                let (n, token) = match *kind {
                    "http-01" => (1, HTTP_TOKEN),
                    _ => (2, DNS_TOKEN),
                };
                let mut challenge = json!({
                    "type": kind,
                    "url": format!("{}/chall/{}{}", CA, id, n),
                    "token": token,
                    "status": status,
                });
                if status == "invalid" {
                    challenge["error"] = json!({
                        "type": "urn:ietf:params:acme:error:unauthorized",
                        "detail": "Invalid response from http://example.com"
                    });
                }
                challenge
            })
            .collect();
        json!({
            "identifier": {"type": "dns", "value": domain},
            "status": status,
            "expires": "2026-10-23T00:00:00Z",
            "challenges": challenges,
        })
    }

    fn poll_authorization(&mut self, id: usize, url: &str) -> HttpResponse {
        let Some(authz) = self.authorizations.get_mut(&id) else {
            return not_found(url);
        };
        let status = if authz.notified && authz.pending_polls > 0 {
            authz.pending_polls -= 1;
            "pending"
        } else {
            self.authorization_status(id)
        };
        respond(200, self.authorization_json(id, status))
    }

    fn notify(&mut self, challenge_id: usize, url: &str) -> HttpResponse {
        let id = challenge_id / 10;
        let pending_polls = self.pending_polls;
        let Some(authz) = self.authorizations.get_mut(&id) else {
            return not_found(url);
        };
        authz.notified = true;
        authz.pending_polls = pending_polls;
        self.journal.push(format!("notify {}", url));

        let token = if challenge_id % 10 == 1 { HTTP_TOKEN } else { DNS_TOKEN };
        self.served_at_notify = self
            .webroot
            .as_ref()
            .and_then(|root| fs::read_to_string(root.join(token)).ok());
        respond(
            200,
            json!({"type": "http-01", "url": url, "token": token, "status": "processing"}),
        )
    }
}

fn verify_signature(protected64: &str, payload64: &str, signature64: &str) -> bool {
    match base64::decode(signature64) {
        Ok(signature) => {
            verify_with_test_key(format!("{}.{}", protected64, payload64).as_bytes(), &signature)
        }
        Err(_) => false,
    }
}

/// 以共用金鑰的 JWK 公開參數驗證 RS256 簽名。
pub fn verify_with_test_key(data: &[u8], signature: &[u8]) -> bool {
    let jwk = test_key().jwk().clone();
    let verify = || -> Option<bool> {
        let n = BigNum::from_slice(&base64::decode(jwk.modulus()).ok()?).ok()?;
        let e = BigNum::from_slice(&base64::decode(jwk.exponent()).ok()?).ok()?;
        let public = PKey::from_rsa(Rsa::from_public_components(n, e).ok()?).ok()?;
        let mut verifier = Verifier::new(MessageDigest::sha256(), &public).ok()?;
        verifier.update(data).ok()?;
        verifier.verify(signature).ok()
    };
    verify().unwrap_or(false)
}
