//! HTTP 傳輸層。
//!
//! [`HttpClient`] 是與外界交換位元組的唯一介面；內建實作 [`ReqwestClient`]
//! 使用 reqwest 的阻塞客戶端，測試時則替換成假的 CA。

use std::time::Duration;

use reqwest::{
    blocking::Client,
    header::{HeaderMap, CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result, BAD_NONCE_URN};

/// ACME 要求所有 POST 使用的 Content-Type。
pub const JOSE_CONTENT_TYPE: &str = "application/jose+json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
}

/// 一個待送出的 HTTP 請求。
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
}

impl HttpRequest {
    /// 不帶內容的 GET，用於目錄與 HTTP-01 自我檢查。
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
        }
    }

    /// 不帶內容的 HEAD，用於取得新的 nonce。
    pub fn head(url: impl Into<String>) -> Self {
        Self {
            method: Method::Head,
            url: url.into(),
            body: None,
        }
    }

    /// 以 `application/jose+json` 送出的 POST。
    pub fn post_jose(url: impl Into<String>, body: String) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
        }
    }
}

/// 伺服器回應：狀態碼、標頭與原始內容。
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// 狀態碼是否屬於 ACME 視為成功的 200、201、204。
    pub fn is_success(&self) -> bool {
        matches!(self.status, 200 | 201 | 204)
    }

    /// 嘗試將內容解析為 JSON，失敗時回傳 `None`。
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// 將內容反序列化為指定型別。
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// 以 UTF-8 解讀內容，無效位元組以替代字元取代。
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// 取得標頭值；不存在或不是可見 ASCII 時回傳 `None`。
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn location(&self) -> Option<&str> {
        self.header("Location")
    }

    pub fn replay_nonce(&self) -> Option<&str> {
        self.header("Replay-Nonce")
    }

    /// 是否為 CA 因 nonce 失效而拒絕的 400 回應。
    pub fn is_bad_nonce(&self) -> bool {
        self.status == 400
            && self
                .json()
                .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_owned))
                .is_some_and(|kind| kind == BAD_NONCE_URN)
    }
}

/// 執行 HTTP 交換的能力。
///
/// 實作者只負責傳輸：連線逾時回傳 [`Error::Timeout`]，其他傳輸失敗回傳
/// [`Error::Network`]；任何狀態碼都視為成功取得回應。
pub trait HttpClient: Send + Sync {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// 以 reqwest 阻塞客戶端實作的 [`HttpClient`]。
#[derive(Debug)]
pub struct ReqwestClient {
    client: Client,
    timeout: Duration,
}

impl ReqwestClient {
    /// 建立客戶端，`timeout` 套用於每一個請求。
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                url: url.to_owned(),
                after: self.timeout,
            }
        } else {
            Error::network(url, err)
        }
    }
}

impl HttpClient for ReqwestClient {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Head => self.client.head(&request.url),
            Method::Post => self
                .client
                .post(&request.url)
                .header(CONTENT_TYPE, JOSE_CONTENT_TYPE)
                .body(request.body.unwrap_or_default()),
        };

        let response = builder
            .send()
            .map_err(|e| self.classify(&request.url, e))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .map_err(|e| self.classify(&request.url, e))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// 未簽名的請求：非 200、201、204 的回應轉為 [`Error::Http`]。
pub fn request(http: &dyn HttpClient, request: HttpRequest) -> Result<HttpResponse> {
    let url = request.url.clone();
    let response = http.send(request)?;
    if !response.is_success() {
        return Err(Error::Http {
            url,
            code: response.status,
            body: response.text(),
        });
    }
    Ok(response)
}
