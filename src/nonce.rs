use log::trace;

use crate::{
    error::{Error, Result},
    transport::{self, HttpClient, HttpRequest, HttpResponse},
};

/// 管理防重放用的 nonce。
///
/// 上一個回應的 `Replay-Nonce` 會被暫存並且只使用一次；沒有暫存時，
/// 簽名前立即向 `newNonce` 端點取得新的 nonce。
#[derive(Debug)]
pub struct NoncePool {
    url: String,
    cached: Option<String>,
}

impl NoncePool {
    pub fn new(new_nonce_url: impl Into<String>) -> Self {
        Self {
            url: new_nonce_url.into(),
            cached: None,
        }
    }

    /// 取出一個尚未使用過的 nonce。
    pub fn next(&mut self, http: &dyn HttpClient) -> Result<String> {
        if let Some(nonce) = self.cached.take() {
            return Ok(nonce);
        }
        self.fetch(http)
    }

    /// 記下回應中附帶的 nonce，供下一次簽名請求使用。
    pub fn remember(&mut self, response: &HttpResponse) {
        if let Some(nonce) = response.replay_nonce() {
            self.cached = Some(nonce.to_owned());
        }
    }

    /// 透過 HTTP HEAD 請求取得回應中的 `Replay-Nonce` 標頭。
    fn fetch(&self, http: &dyn HttpClient) -> Result<String> {
        trace!("Fetching a fresh nonce from {}", self.url);
        let response = transport::request(http, HttpRequest::head(&self.url))?;
        response
            .replay_nonce()
            .map(str::to_owned)
            .ok_or_else(|| Error::protocol(&self.url, "no Replay-Nonce header found in response"))
    }
}
