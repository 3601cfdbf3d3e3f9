use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    transport::{self, HttpClient, HttpRequest},
};

/// Let's Encrypt 正式環境的目錄 URL。
pub const DEFAULT_DIRECTORY_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// ACME 目錄：各項協議操作對應的 URL，於工作階段開始時取得一次。
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Directory {
    /// 用於取得新的 nonce。
    #[serde(rename = "newNonce")]
    pub new_nonce: String,
    /// 用於新帳號註冊。
    #[serde(rename = "newAccount")]
    pub new_account: String,
    /// 用於建立訂單。
    #[serde(rename = "newOrder")]
    pub new_order: String,
    #[serde(rename = "revokeCert", default, skip_serializing_if = "Option::is_none")]
    pub revoke_cert: Option<String>,
    #[serde(rename = "keyChange", default, skip_serializing_if = "Option::is_none")]
    pub key_change: Option<String>,
    /// 服務條款等附加資訊。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Directory {
    /// 以 GET 取得並解析目錄。
    ///
    /// # 錯誤
    ///
    /// 傳輸失敗、狀態碼非成功或內容無法解析時，一律回傳 [`Error::Directory`]。
    pub fn fetch(http: &dyn HttpClient, url: &str) -> Result<Self> {
        let directory_error = |reason: String| Error::Directory {
            url: url.to_owned(),
            reason,
        };
        let response = transport::request(http, HttpRequest::get(url))
            .map_err(|e| directory_error(e.to_string()))?;
        response
            .parse()
            .map_err(|e| directory_error(e.to_string()))
    }

    /// 目錄中宣告的服務條款網址。
    pub fn terms_of_service(&self) -> Option<&str> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.get("termsOfService"))
            .and_then(Value::as_str)
    }
}
