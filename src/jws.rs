//! JSON Web Signature 的扁平 JSON 序列化形式。

use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    protection::ProtectedHeader,
    signature::{create_signature, Signer},
};

/// 送往 CA 的 JWS 物件，三個欄位皆為 base64url 字串。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Jws {
    #[serde(rename = "protected")]
    pub header: String,
    pub payload: String,
    pub signature: String,
}

impl Jws {
    /// 以 `signer` 對保護頭與已編碼的 payload 簽名。
    ///
    /// `payload_b64` 為空字串時即為 POST-as-GET。
    pub fn sign(signer: &dyn Signer, header: &ProtectedHeader, payload_b64: &str) -> Result<Self> {
        let header = header.to_base64()?;
        let signature = create_signature(signer, &header, payload_b64)?;
        Ok(Jws {
            header,
            payload: payload_b64.to_owned(),
            signature,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
