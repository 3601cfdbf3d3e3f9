//! 挑戰回應器：讓 CA 能驗證網域控制權的本地動作。
//!
//! HTTP-01 把 key authorization 寫到網站根目錄下的檔案；DNS-01 透過
//! [`DnsProvisioner`] 新增 TXT 記錄並等待傳播。

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    sync::Arc,
    time::Duration,
};

use log::{debug, info};

use crate::{
    challenge::{dns_txt_value, ChallengeType},
    error::{Error, Result},
    poll::Clock,
    transport::{HttpClient, HttpRequest},
};

/// 針對單一挑戰類型的本地準備、自我檢查與清除。
///
/// `token` 一律為淨化後的 token。
pub trait ChallengeResponder: Send + Sync {
    fn challenge_type(&self) -> ChallengeType;

    /// 佈署驗證內容；失敗時 CA 不會被通知。
    fn prepare(&self, domain: &str, token: &str, key_authorization: &str) -> Result<()>;

    /// 通知 CA 前的自我檢查，回傳 `false` 代表內容不符。
    fn verify(&self, domain: &str, token: &str, key_authorization: &str) -> Result<bool>;

    /// 移除 `prepare` 佈署的內容。
    fn cleanup(&self, domain: &str, token: &str, key_authorization: &str) -> Result<()>;
}

/// HTTP-01：將 key authorization 寫入 `<acme_dir>/<token>`。
pub struct Http01Responder {
    acme_dir: PathBuf,
    check_port: Option<u16>,
    disable_check: bool,
    http: Arc<dyn HttpClient>,
}

impl Http01Responder {
    /// 建立 HTTP-01 回應器。
    ///
    /// # 參數
    ///
    /// - `acme_dir`: 網站伺服器對外提供 `/.well-known/acme-challenge/` 的目錄
    /// - `http`: 自我檢查時使用的 HTTP 客戶端
    pub fn new(acme_dir: impl Into<PathBuf>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            acme_dir: acme_dir.into(),
            check_port: None,
            disable_check: false,
            http,
        }
    }

    /// 自我檢查時連線的連接埠，未設定時使用 80。
    pub fn check_port(mut self, port: Option<u16>) -> Self {
        self.check_port = port;
        self
    }

    /// 略過自我檢查，直接通知 CA。
    pub fn disable_check(mut self, disable: bool) -> Self {
        self.disable_check = disable;
        self
    }

    fn challenge_path(&self, token: &str) -> PathBuf {
        self.acme_dir.join(token)
    }

    /// 自我檢查使用的 URL。
    pub fn well_known_url(&self, domain: &str, token: &str) -> String {
        match self.check_port {
            Some(port) => format!("http://{}:{}/.well-known/acme-challenge/{}", domain, port, token),
            None => format!("http://{}/.well-known/acme-challenge/{}", domain, token),
        }
    }
}

impl ChallengeResponder for Http01Responder {
    fn challenge_type(&self) -> ChallengeType {
        ChallengeType::Http01
    }

    fn prepare(&self, domain: &str, token: &str, key_authorization: &str) -> Result<()> {
        let path = self.challenge_path(token);
        fs::write(&path, key_authorization).map_err(|e| Error::ChallengeSetup {
            domain: domain.to_owned(),
            reason: format!("couldn't write {}: {}", path.display(), e),
        })
    }

    fn verify(&self, domain: &str, token: &str, key_authorization: &str) -> Result<bool> {
        if self.disable_check {
            return Ok(true);
        }
        let url = self.well_known_url(domain, token);
        let path = self.challenge_path(token);
        let setup_error = |reason: String| Error::ChallengeSetup {
            domain: domain.to_owned(),
            reason: format!(
                "wrote file to {}, but couldn't download {}: {}",
                path.display(),
                url,
                reason
            ),
        };

        let response = self
            .http
            .send(HttpRequest::get(&url))
            .map_err(|e| setup_error(e.to_string()))?;
        if !response.is_success() {
            return Err(setup_error(format!("status {}", response.status)));
        }
        Ok(response.text() == key_authorization)
    }

    fn cleanup(&self, _domain: &str, token: &str, _key_authorization: &str) -> Result<()> {
        fs::remove_file(self.challenge_path(token))?;
        Ok(())
    }
}

/// 交給 DNS 佈建動作的參數。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsChallengeRecord {
    pub challenge_type: ChallengeType,
    pub domain: String,
    pub token: String,
    pub key_authorization: String,
    pub provider: String,
}

impl DnsChallengeRecord {
    /// `_acme-challenge.<domain>`
    pub fn record_name(&self) -> String {
        format!("_acme-challenge.{}", self.domain)
    }

    /// 實際寫入 TXT 記錄的值。
    pub fn txt_value(&self) -> String {
        dns_txt_value(&self.key_authorization)
    }
}

/// 新增與移除 DNS-01 驗證用的 TXT 記錄。
pub trait DnsProvisioner: Send + Sync {
    fn add_txt(&self, record: &DnsChallengeRecord) -> Result<()>;
    fn remove_txt(&self, record: &DnsChallengeRecord) -> Result<()>;
}

/// DNS-01：透過 [`DnsProvisioner`] 佈署 TXT 記錄，並在通知 CA 前等待傳播。
pub struct Dns01Responder {
    provisioner: Box<dyn DnsProvisioner>,
    provider: String,
    propagation_wait: Duration,
    clock: Arc<dyn Clock>,
}

impl Dns01Responder {
    /// 建立 DNS-01 回應器。
    ///
    /// # 參數
    ///
    /// - `provisioner`: 實際新增與移除 TXT 記錄的佈建器
    /// - `provider`: 傳給佈建器的 DNS 服務商名稱，可為空字串
    /// - `propagation_wait`: 新增記錄後、通知 CA 前的等待時間
    /// - `clock`: 執行等待的時間來源
    pub fn new(
        provisioner: Box<dyn DnsProvisioner>,
        provider: impl Into<String>,
        propagation_wait: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provisioner,
            provider: provider.into(),
            propagation_wait,
            clock,
        }
    }

    fn record(&self, domain: &str, token: &str, key_authorization: &str) -> DnsChallengeRecord {
        DnsChallengeRecord {
            challenge_type: ChallengeType::Dns01,
            domain: domain.to_owned(),
            token: token.to_owned(),
            key_authorization: key_authorization.to_owned(),
            provider: self.provider.clone(),
        }
    }
}

impl ChallengeResponder for Dns01Responder {
    fn challenge_type(&self) -> ChallengeType {
        ChallengeType::Dns01
    }

    fn prepare(&self, domain: &str, token: &str, key_authorization: &str) -> Result<()> {
        info!("Setting up DNS challenge for {}...", domain);
        self.provisioner
            .add_txt(&self.record(domain, token, key_authorization))?;
        info!(
            "DNS challenge setup complete. Waiting {}s for propagation...",
            self.propagation_wait.as_secs()
        );
        self.clock.sleep(self.propagation_wait);
        Ok(())
    }

    // TXT 記錄不做解析檢查，等待時間即為唯一保證
    fn verify(&self, _domain: &str, _token: &str, _key_authorization: &str) -> Result<bool> {
        Ok(true)
    }

    fn cleanup(&self, domain: &str, token: &str, key_authorization: &str) -> Result<()> {
        info!("Cleaning up DNS challenge for {}...", domain);
        self.provisioner
            .remove_txt(&self.record(domain, token, key_authorization))
    }
}

/// 以 `/bin/sh <script> <add|rm> <domain> <token> <key_auth>` 執行的佈建腳本。
#[derive(Debug, Clone)]
pub struct ScriptProvisioner {
    script: PathBuf,
}

impl ScriptProvisioner {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    fn run(&self, action: &str, record: &DnsChallengeRecord) -> Result<()> {
        let api_error = |reason: String| Error::DnsApi {
            action: action.to_owned(),
            domain: record.domain.clone(),
            reason,
        };
        if !is_executable(&self.script) {
            return Err(api_error(format!(
                "DNS API script not found or not executable: {}",
                self.script.display()
            )));
        }

        let output = Command::new("/bin/sh")
            .arg(&self.script)
            .args([
                action,
                record.domain.as_str(),
                record.token.as_str(),
                record.key_authorization.as_str(),
            ])
            .env("ACME_CHALLENGE_TYPE", record.challenge_type.as_str())
            .env("ACME_DOMAIN", &record.domain)
            .env("ACME_TOKEN", &record.token)
            .env("ACME_KEY_AUTH", &record.key_authorization)
            .env("DNS_PROVIDER", &record.provider)
            .env("ACME_TXT_RECORD", record.record_name())
            .env("ACME_TXT_VALUE", record.txt_value())
            .output()
            .map_err(|e| api_error(e.to_string()))?;

        if !output.status.success() {
            return Err(api_error(
                String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            ));
        }
        debug!(
            "DNS API {} {}: {}",
            action,
            record.domain,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }
}

impl DnsProvisioner for ScriptProvisioner {
    fn add_txt(&self, record: &DnsChallengeRecord) -> Result<()> {
        self.run("add", record)
    }

    fn remove_txt(&self, record: &DnsChallengeRecord) -> Result<()> {
        self.run("rm", record)
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
