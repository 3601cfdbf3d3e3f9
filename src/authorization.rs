use serde::Deserialize;
use serde_json::Value;

use crate::{
    challenge::{Challenge, ChallengeType},
    error::Result,
    payload::Identifier,
    poll::Pollable,
    session::Session,
    transport::HttpResponse,
};

/// 授權狀態。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,
    #[serde(other)]
    Unknown,
}

/// 單一網域的驗證紀錄。
#[derive(Debug, Clone, Deserialize)]
pub struct Authorization {
    pub identifier: Identifier,
    pub status: AuthorizationStatus,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
    #[serde(default)]
    pub wildcard: Option<bool>,
    #[serde(default)]
    pub expires: Option<String>,
    /// CA 回傳的原始內容，失敗時原樣交給呼叫端。
    #[serde(skip)]
    pub raw: Value,
}

impl Authorization {
    /// 以 POST-as-GET 取得授權。
    pub fn fetch(session: &mut Session, url: &str) -> Result<Self> {
        Self::from_response(&session.post_as_get(url)?)
    }

    /// 授權對應的網域，萬用字元授權不含 `*.` 前綴。
    pub fn domain(&self) -> &str {
        &self.identifier.value
    }

    /// 找出指定類型的挑戰。
    pub fn challenge(&self, challenge_type: ChallengeType) -> Option<&Challenge> {
        self.challenges.iter().find(|c| c.is_type(challenge_type))
    }
}

impl Pollable for Authorization {
    fn is_pending(&self) -> bool {
        self.status == AuthorizationStatus::Pending
    }

    fn from_response(response: &HttpResponse) -> Result<Self> {
        let mut authorization: Self = response.parse()?;
        authorization.raw = response.json().unwrap_or_default();
        Ok(authorization)
    }
}
