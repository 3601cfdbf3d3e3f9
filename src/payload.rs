use serde::{Deserialize, Serialize};

use crate::csr::DomainSet;

/// 建立新帳號所需的載荷資料。
///
/// 一律同意服務條款；沒有聯絡資訊時不送出 `contact` 欄位。
#[derive(Debug, Serialize, Deserialize)]
pub struct NewAccountPayload {
    #[serde(rename = "termsOfServiceAgreed")]
    terms_of_service_agreed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    contact: Option<Vec<String>>,
}

impl NewAccountPayload {
    pub fn new(contact: Option<&[String]>) -> Self {
        NewAccountPayload {
            terms_of_service_agreed: true,
            contact: contact.map(<[String]>::to_vec),
        }
    }
}

/// 更新既有帳號聯絡資訊的載荷。
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateContactPayload {
    pub contact: Vec<String>,
}

/// 識別項，描述證書所涵蓋的主機名稱。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub type_: String,
    pub value: String,
}

impl Identifier {
    pub fn dns(value: impl Into<String>) -> Self {
        Identifier {
            type_: "dns".to_string(),
            value: value.into(),
        }
    }
}

/// 建立新訂單時的載荷，每個網域一個 `dns` 類型的識別項。
#[derive(Debug, Serialize, Deserialize)]
pub struct NewOrderPayload {
    pub identifiers: Vec<Identifier>,
}

impl NewOrderPayload {
    pub fn new(domains: &DomainSet) -> Self {
        NewOrderPayload {
            identifiers: domains.iter().map(Identifier::dns).collect(),
        }
    }
}

/// 通知 CA 挑戰已就緒的載荷，內容為空物件 `{}`。
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ChallengeValidationPayload {}

impl ChallengeValidationPayload {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 最終化訂單的載荷，`csr` 為 DER 的 base64url 編碼。
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalizeOrderPayload {
    #[serde(rename = "csr")]
    csr_b64_str: String,
}

impl FinalizeOrderPayload {
    pub fn new(csr_der: &[u8]) -> Self {
        FinalizeOrderPayload {
            csr_b64_str: crate::base64::encode(csr_der),
        }
    }
}
