//! 簽發流程的設定。
//!
//! [`Config`] 可以從 JSON 檔案讀取，也可以透過 [`ConfigBuilder`] 以預設值為基礎
//! 逐項設定。

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{
    challenge::ChallengeType,
    directory::DEFAULT_DIRECTORY_URL,
    error::{Error, Result},
};

/// 預設的單一請求逾時秒數。
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// 預設的 DNS 傳播等待秒數。
pub const DEFAULT_DNS_PROPAGATION_WAIT_SECS: u64 = 30;
/// 預設的 DNS 佈建腳本。
pub const DEFAULT_DNS_SCRIPT: &str = "dnsapi/dns_api.sh";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// PEM 格式的 RSA 帳戶私鑰。
    pub account_key: PathBuf,
    /// PEM 或 DER 格式的 CSR。
    pub csr: PathBuf,
    #[serde(default = "default_directory_url")]
    pub directory_url: String,
    #[serde(default)]
    pub contact: Option<Vec<String>>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub challenge: ChallengeConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ChallengeConfig {
    #[serde(rename = "type")]
    pub challenge_type: ChallengeType,
    /// HTTP-01 驗證檔案的寫入目錄。
    pub acme_dir: Option<PathBuf>,
    pub check_port: Option<u16>,
    pub disable_check: bool,
    pub dns_script: PathBuf,
    pub dns_provider: String,
    pub dns_propagation_wait_secs: u64,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            challenge_type: ChallengeType::Http01,
            acme_dir: None,
            check_port: None,
            disable_check: false,
            dns_script: PathBuf::from(DEFAULT_DNS_SCRIPT),
            dns_provider: String::new(),
            dns_propagation_wait_secs: DEFAULT_DNS_PROPAGATION_WAIT_SECS,
        }
    }
}

impl ChallengeConfig {
    pub fn dns_propagation_wait(&self) -> Duration {
        Duration::from_secs(self.dns_propagation_wait_secs)
    }
}

fn default_directory_url() -> String {
    DEFAULT_DIRECTORY_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Config {
    /// 讀取 JSON 設定檔並檢查其內容。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_slice(&data)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 檢查設定之間的相依關係。
    pub fn validate(&self) -> Result<()> {
        if self.challenge.challenge_type == ChallengeType::Http01
            && self.challenge.acme_dir.is_none()
        {
            return Err(Error::Config(
                "http-01 challenges require an acme-dir".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// 以預設值為基礎建構 [`Config`]。
///
/// 預設值包括：
/// - ACME 目錄 URL：Let's Encrypt 正式環境
/// - 請求逾時：30 秒
/// - 挑戰類型：`http-01`
/// - DNS 傳播等待：30 秒，腳本為 `dnsapi/dns_api.sh`
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// 以帳戶私鑰與 CSR 路徑建立，其餘欄位使用預設值。
    pub fn new(account_key: impl Into<PathBuf>, csr: impl Into<PathBuf>) -> Self {
        ConfigBuilder {
            config: Config {
                account_key: account_key.into(),
                csr: csr.into(),
                directory_url: default_directory_url(),
                contact: None,
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                challenge: ChallengeConfig::default(),
            },
        }
    }

    pub fn directory_url(mut self, url: &str) -> Self {
        self.config.directory_url = url.to_string();
        self
    }

    pub fn contact(mut self, contact: Vec<String>) -> Self {
        self.config.contact = Some(contact);
        self
    }

    /// 設定單一請求的逾時秒數。
    ///
    /// # 參數
    ///
    /// - `secs`: 逾時秒數，必須大於零，否則 [`ConfigBuilder::build`] 會失敗
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn challenge_type(mut self, challenge_type: ChallengeType) -> Self {
        self.config.challenge.challenge_type = challenge_type;
        self
    }

    pub fn acme_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.challenge.acme_dir = Some(dir.into());
        self
    }

    pub fn check_port(mut self, port: u16) -> Self {
        self.config.challenge.check_port = Some(port);
        self
    }

    pub fn disable_check(mut self, disable: bool) -> Self {
        self.config.challenge.disable_check = disable;
        self
    }

    pub fn dns_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.config.challenge.dns_script = script.into();
        self
    }

    pub fn dns_provider(mut self, provider: &str) -> Self {
        self.config.challenge.dns_provider = provider.to_string();
        self
    }

    /// 設定新增 TXT 記錄後、通知 CA 之前的等待秒數。
    pub fn dns_propagation_wait_secs(mut self, secs: u64) -> Self {
        self.config.challenge.dns_propagation_wait_secs = secs;
        self
    }

    /// 套用環境變數 `DNS_PROPAGATION_WAIT` 與 `DNS_PROVIDER`。
    pub fn from_env(self) -> Result<Self> {
        self.overlay(|name| env::var(name).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(wait) = lookup("DNS_PROPAGATION_WAIT") {
            self.config.challenge.dns_propagation_wait_secs =
                wait.trim().parse().map_err(|_| {
                    Error::Config(format!("invalid DNS_PROPAGATION_WAIT: {}", wait))
                })?;
        }
        if let Some(provider) = lookup("DNS_PROVIDER") {
            self.config.challenge.dns_provider = provider;
        }
        Ok(self)
    }

    /// 檢查設定並產生 [`Config`]。
    ///
    /// # 回傳
    ///
    /// 設定互相矛盾時回傳 [`Error::Config`]，例如 `http-01` 未指定 `acme-dir`。
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
