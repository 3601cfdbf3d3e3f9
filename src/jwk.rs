use openssl::sha::sha256;
use serde::{Deserialize, Serialize};

use crate::{base64, error::Result};

/// RSA 公鑰的 JSON Web Key 表示。
///
/// 欄位依字母順序宣告（`e`、`kty`、`n`），序列化結果即為 RFC 7638 要求的
/// 標準形式：鍵名排序且不含多餘空白，可直接用於計算 thumbprint。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    e: String,
    kty: String,
    n: String,
}

impl Jwk {
    /// 根據 RSA 的模數與公開指數（皆為大端序位元組）建立 JWK。
    ///
    /// 兩者都會先去除前導的零位元組，確保指數是最短且偶數長度的十六進位表示。
    pub fn rsa(modulus: &[u8], exponent: &[u8]) -> Self {
        Jwk {
            e: base64::encode(strip_leading_zeros(exponent)),
            kty: "RSA".to_owned(),
            n: base64::encode(strip_leading_zeros(modulus)),
        }
    }

    /// 產生標準形式的 JSON 字串。
    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 計算 JWK 的 thumbprint：base64url(SHA-256(標準 JSON))。
    pub fn thumbprint(&self) -> Result<String> {
        let hash = sha256(self.to_canonical_json()?.as_bytes());
        Ok(base64::encode(hash))
    }

    /// base64url 編碼的模數 `n`。
    pub fn modulus(&self) -> &str {
        &self.n
    }

    /// base64url 編碼的公開指數 `e`。
    pub fn exponent(&self) -> &str {
        &self.e
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}
