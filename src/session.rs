//! 簽名請求的工作階段。
//!
//! [`Session`] 持有目錄、nonce 與帳戶 URL，取代散落各處的全域狀態；
//! 每個需要簽名的 CA 呼叫都經由它送出。

use std::sync::Arc;

use log::debug;
use serde::Serialize;

use crate::{
    base64,
    directory::Directory,
    error::{Error, Result},
    jws::Jws,
    nonce::NoncePool,
    protection::{KeyId, ProtectedHeader},
    signature::Signer,
    transport::{HttpClient, HttpRequest, HttpResponse},
};

/// badNonce 最多重試的次數（不含第一次嘗試）。
pub const MAX_BAD_NONCE_RETRIES: u32 = 100;

/// 一次憑證申請流程的協議狀態。
pub struct Session {
    http: Arc<dyn HttpClient>,
    signer: Arc<dyn Signer>,
    directory: Directory,
    nonces: NoncePool,
    kid: Option<String>,
}

impl Session {
    /// 以已取得的目錄建立工作階段，此時尚未註冊帳戶。
    pub fn new(http: Arc<dyn HttpClient>, signer: Arc<dyn Signer>, directory: Directory) -> Self {
        let nonces = NoncePool::new(&directory.new_nonce);
        Self {
            http,
            signer,
            directory,
            nonces,
            kid: None,
        }
    }

    /// 取得目錄並建立工作階段。
    pub fn connect(
        http: Arc<dyn HttpClient>,
        signer: Arc<dyn Signer>,
        directory_url: &str,
    ) -> Result<Self> {
        let directory = Directory::fetch(&*http, directory_url)?;
        Ok(Self::new(http, signer, directory))
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn signer(&self) -> &dyn Signer {
        &*self.signer
    }

    /// 已註冊帳戶的 URL；設定後所有請求改以 `kid` 識別。
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    pub(crate) fn set_kid(&mut self, kid: impl Into<String>) {
        self.kid = Some(kid.into());
    }

    /// 以 JSON payload 送出簽名的 POST。
    pub fn post<P: Serialize>(&mut self, url: &str, payload: &P) -> Result<HttpResponse> {
        let json = serde_json::to_string(payload)?;
        self.signed_request(url, Some(json))
    }

    /// POST-as-GET：payload 為空字串的簽名請求。
    pub fn post_as_get(&mut self, url: &str) -> Result<HttpResponse> {
        self.signed_request(url, None)
    }

    /// 送出簽名請求。
    ///
    /// 每次嘗試都取用一個新的 nonce；CA 以 badNonce 拒絕時用相同 payload
    /// 立即重試，最多 [`MAX_BAD_NONCE_RETRIES`] 次。其餘失敗回應皆轉為
    /// [`Error::Acme`]。
    fn signed_request(&mut self, url: &str, payload: Option<String>) -> Result<HttpResponse> {
        let payload64 = payload.as_deref().map(base64::encode).unwrap_or_default();
        let mut retries = 0;

        loop {
            let nonce = self.nonces.next(&*self.http)?;
            let body = self.envelope(url, &nonce, &payload64)?;
            let response = self.http.send(HttpRequest::post_jose(url, body))?;
            self.nonces.remember(&response);

            if response.is_bad_nonce() && retries < MAX_BAD_NONCE_RETRIES {
                retries += 1;
                debug!("Bad nonce for {}, retrying ({}/{})", url, retries, MAX_BAD_NONCE_RETRIES);
                continue;
            }
            if !response.is_success() {
                return Err(Error::Acme {
                    url: url.to_owned(),
                    payload: payload.unwrap_or_default(),
                    code: response.status,
                    body: response.text(),
                    problem: response.parse().ok(),
                });
            }
            return Ok(response);
        }
    }

    fn envelope(&self, url: &str, nonce: &str, payload64: &str) -> Result<String> {
        let key_id = match &self.kid {
            Some(kid) => KeyId::Kid(kid),
            None => KeyId::Jwk(self.signer.jwk()),
        };
        let header = ProtectedHeader::new(url, self.signer.alg(), nonce, key_id);
        Jws::sign(&*self.signer, &header, payload64)?.to_json()
    }
}
