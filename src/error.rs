//! 全庫共用的錯誤型別。
//!
//! 除了 badNonce 之外，任何錯誤都會直接中止整個申請流程；重新執行即是復原方式。

use std::{error::Error as StdError, fmt, io, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// CA 回傳的 badNonce 錯誤類型 URN。
pub const BAD_NONCE_URN: &str = "urn:ietf:params:acme:error:badNonce";
/// CA 回傳的 rateLimited 錯誤類型 URN。
pub const RATE_LIMITED_URN: &str = "urn:ietf:params:acme:error:rateLimited";

/// 申請憑證過程中所有可能發生的錯誤。
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to parse account key {path:?}: {reason}")]
    KeyParse { path: Option<PathBuf>, reason: String },
    #[error("Failed to parse CSR {path:?}: {reason}")]
    CsrParse { path: Option<PathBuf>, reason: String },
    #[error("Failed to get ACME directory from {url}: {reason}")]
    Directory { url: String, reason: String },
    #[error("Request to {url} timed out after {} seconds", .after.as_secs())]
    Timeout { url: String, after: Duration },
    #[error("Network error contacting {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("HTTP {code} from {url}: {body}")]
    Http { url: String, code: u16, body: String },
    #[error("ACME request to {url} failed with {code}: {body}")]
    Acme {
        url: String,
        payload: String,
        code: u16,
        body: String,
        problem: Option<Problem>,
    },
    #[error("Challenge type {challenge_type} not available for domain {domain}")]
    UnsupportedChallenge {
        domain: String,
        challenge_type: String,
    },
    #[error("Challenge setup failed for {domain}: {reason}")]
    ChallengeSetup { domain: String, reason: String },
    #[error("DNS API failed ({action} {domain}): {reason}")]
    DnsApi {
        action: String,
        domain: String,
        reason: String,
    },
    #[error("Challenge did not pass for {domain}: {authorization}")]
    ChallengeFailed { domain: String, authorization: Value },
    #[error("Order failed: {order}")]
    OrderFailed { order: Value },
    #[error("Signing error: {0}")]
    Signing(String),
    #[error("Unexpected response from {url}: {reason}")]
    Protocol { url: String, reason: String },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// 本庫使用的結果型別。
pub type Result<T> = std::result::Result<T, Error>;

/// RFC 7807 problem document，CA 在請求失敗時回傳。
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Problem {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub subproblems: Vec<Problem>,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.detail) {
            (Some(kind), Some(detail)) => write!(f, "{}: {}", kind, detail),
            (Some(kind), None) => write!(f, "{}", kind),
            (None, Some(detail)) => write!(f, "{}", detail),
            (None, None) => write!(f, "unknown problem"),
        }
    }
}

/// 提供給操作者的錯誤分類，讓呼叫端不必解析協議細節即可區分失敗原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    RateLimited,
    Network,
    ValidationFailed,
    OrderFailed,
    Other,
}

impl Error {
    /// 將錯誤歸類為速率限制、網路、驗證失敗、訂單失敗或其他。
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Acme { code, problem, .. } => {
                let rate_limited = *code == 429
                    || problem
                        .as_ref()
                        .and_then(|p| p.kind.as_deref())
                        .is_some_and(|kind| kind == RATE_LIMITED_URN);
                if rate_limited {
                    ErrorCategory::RateLimited
                } else {
                    ErrorCategory::Other
                }
            }
            Error::Http { code: 429, .. } => ErrorCategory::RateLimited,
            Error::Timeout { .. } | Error::Network { .. } => ErrorCategory::Network,
            Error::ChallengeFailed { .. } => ErrorCategory::ValidationFailed,
            Error::OrderFailed { .. } => ErrorCategory::OrderFailed,
            _ => ErrorCategory::Other,
        }
    }

    /// 取出 CA 回傳內容中可供機器判讀的說明，依序嘗試 `detail`、`error`、`type`。
    pub fn detail(&self) -> Option<String> {
        match self {
            Error::Acme { problem, body, .. } => match problem {
                Some(Problem {
                    detail: Some(detail),
                    ..
                }) => Some(detail.clone()),
                _ => serde_json::from_str::<Value>(body)
                    .ok()
                    .as_ref()
                    .and_then(detail_of),
            },
            Error::ChallengeFailed { authorization, .. } => detail_of(authorization),
            Error::OrderFailed { order } => detail_of(order),
            _ => None,
        }
    }

    pub(crate) fn network(url: &str, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Error::Network {
            url: url.to_owned(),
            source: source.into(),
        }
    }

    pub(crate) fn protocol(url: &str, reason: impl Into<String>) -> Self {
        Error::Protocol {
            url: url.to_owned(),
            reason: reason.into(),
        }
    }
}

fn detail_of(value: &Value) -> Option<String> {
    // 挑戰失敗時 problem 會掛在 challenges[].error 之下
    if let Some(challenges) = value.get("challenges").and_then(Value::as_array) {
        if let Some(found) = challenges
            .iter()
            .filter_map(|c| c.get("error"))
            .find_map(detail_of)
        {
            return Some(found);
        }
    }
    ["detail", "error", "type"].iter().find_map(|key| match value.get(*key)? {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => detail_of(&value[*key]),
        Value::Null => None,
        other => Some(other.to_string()),
    })
}
