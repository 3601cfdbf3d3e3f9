//! ACME 帳戶註冊。

use log::info;
use serde::Deserialize;

use crate::{
    error::{Error, Result},
    payload::{NewAccountPayload, UpdateContactPayload},
    session::Session,
};

/// CA 端的帳戶。
#[derive(Debug, Clone)]
pub struct Account {
    /// 帳戶 URL，即之後所有請求的 `kid`。
    pub url: String,
    /// 本次請求是否新建立帳戶（HTTP 201）。
    pub created: bool,
    pub contact: Vec<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AccountResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    contact: Vec<String>,
}

impl Account {
    /// 向 `newAccount` 註冊帳戶，並將帳戶 URL 設為工作階段的 `kid`。
    ///
    /// 201 代表新建立，其他成功狀態代表 CA 回傳了既有帳戶，兩者皆視為成功。
    /// 提供聯絡資訊時會再更新一次帳戶，讓既有帳戶也套用新的聯絡方式。
    ///
    /// # Errors
    ///
    /// 回應缺少 `Location` 標頭時回傳 [`Error::Protocol`]。
    pub fn register(session: &mut Session, contact: Option<&[String]>) -> Result<Self> {
        let new_account_url = session.directory().new_account.clone();
        let response = session.post(&new_account_url, &NewAccountPayload::new(contact))?;

        let url = response
            .location()
            .ok_or_else(|| Error::protocol(&new_account_url, "Location header not found"))?
            .to_owned();
        let created = response.status == 201;
        let body: AccountResponse = response.parse().unwrap_or_default();
        info!(
            "{} Account ID: {}",
            if created { "Registered!" } else { "Already registered!" },
            url
        );
        session.set_kid(&url);

        let mut account = Account {
            url,
            created,
            contact: body.contact,
            status: body.status,
        };
        if let Some(contact) = contact {
            account.update_contact(session, contact)?;
        }
        Ok(account)
    }

    /// 更新帳戶的聯絡資訊。
    pub fn update_contact(&mut self, session: &mut Session, contact: &[String]) -> Result<()> {
        let payload = UpdateContactPayload {
            contact: contact.to_vec(),
        };
        let response = session.post(&self.url, &payload)?;
        let body: AccountResponse = response.parse().unwrap_or_default();
        self.contact = body.contact;
        if body.status.is_some() {
            self.status = body.status;
        }
        info!("Updated contact details:\n{}", self.contact.join("\n"));
        Ok(())
    }
}
