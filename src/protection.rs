use serde::Serialize;

use crate::{base64, error::Result, jwk::Jwk};

/// 簽名者在保護頭中的身分：註冊前內嵌公鑰，註冊後改用帳戶 URL。
#[derive(Debug, Clone, Copy)]
pub enum KeyId<'a> {
    Jwk(&'a Jwk),
    Kid(&'a str),
}

/// JWS 的保護頭 `{url, alg, nonce}` 加上 `jwk` 或 `kid` 其中之一。
#[derive(Debug, Serialize)]
pub struct ProtectedHeader<'a> {
    /// 請求目標 URL
    url: &'a str,
    /// 簽章演算法
    alg: &'a str,
    /// 用於防止重放攻擊的隨機數
    nonce: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    jwk: Option<&'a Jwk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

impl<'a> ProtectedHeader<'a> {
    pub fn new(url: &'a str, alg: &'a str, nonce: &'a str, key_id: KeyId<'a>) -> Self {
        let (jwk, kid) = match key_id {
            KeyId::Jwk(jwk) => (Some(jwk), None),
            KeyId::Kid(kid) => (None, Some(kid)),
        };
        Self {
            url,
            alg,
            nonce,
            jwk,
            kid,
        }
    }

    /// 序列化為 JSON 後以 base64url 編碼。
    pub fn to_base64(&self) -> Result<String> {
        Ok(base64::encode(serde_json::to_vec(self)?))
    }
}
