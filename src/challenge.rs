use std::{fmt, str::FromStr};

use openssl::sha::sha256;
use serde::{Deserialize, Serialize};

use crate::{
    base64,
    error::{Error, Problem},
};

/// 支援的挑戰類型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeType {
    #[serde(rename = "http-01")]
    Http01,
    #[serde(rename = "dns-01")]
    Dns01,
}

impl ChallengeType {
    /// 返回挑戰類型對應的字串表示。
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http01 => "http-01",
            Self::Dns01 => "dns-01",
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http-01" => Ok(Self::Http01),
            "dns-01" => Ok(Self::Dns01),
            other => Err(Error::Config(format!("unsupported challenge type: {}", other))),
        }
    }
}

/// 挑戰的狀態。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Processing,
    Valid,
    Invalid,
    #[serde(other)]
    Unknown,
}

/// 授權中提供的單一挑戰。
///
/// `type` 保留原始字串，CA 提供本庫不認得的類型時仍可正常解析整份授權。
#[derive(Debug, Clone, Deserialize)]
pub struct Challenge {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub token: String,
    pub status: ChallengeStatus,
    #[serde(default)]
    pub validated: Option<String>,
    #[serde(default)]
    pub error: Option<Problem>,
}

impl Challenge {
    pub fn is_type(&self, challenge_type: ChallengeType) -> bool {
        self.kind == challenge_type.as_str()
    }

    /// 淨化後可安全用作檔名的 token。
    pub fn sanitized_token(&self) -> String {
        sanitize_token(&self.token)
    }
}

/// 將 `[A-Za-z0-9_-]` 以外的字元一律替換為 `_`。
pub fn sanitize_token(token: &str) -> String {
    token
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// 計算 key authorization：`token.thumbprint`。
///
/// 同時是 HTTP-01 的檔案內容與交給 DNS-01 佈建動作的值。
pub fn key_authorization(token: &str, thumbprint: &str) -> String {
    format!("{}.{}", sanitize_token(token), thumbprint)
}

/// 根據 key authorization 計算 DNS TXT 記錄值，使用 SHA-256 與 URL-safe Base64 編碼。
pub fn dns_txt_value(key_authorization: &str) -> String {
    base64::encode(sha256(key_authorization.as_bytes()))
}
