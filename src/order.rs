use log::info;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    certificate::Certificate,
    csr::DomainSet,
    error::{Error, Result},
    payload::{FinalizeOrderPayload, Identifier, NewOrderPayload},
    poll::{poll_until_settled, Clock, PollPolicy, Pollable},
    session::Session,
    transport::HttpResponse,
};

/// 訂單狀態，目前支援的狀態有 pending、ready、processing、valid 與 invalid。
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
}

/// 表示訂單資料，並提供建立、下訂、輪詢與憑證下載等操作。
#[derive(Debug, Clone, Deserialize)]
pub struct Order {
    /// 訂單當前狀態
    pub status: OrderStatus,
    /// 過期時間（ISO8601 格式字串）
    #[serde(default)]
    pub expires: Option<String>,
    /// 證書主題（Domain）識別符
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    /// 授權 URL 列表
    #[serde(default)]
    pub authorizations: Vec<String>,
    /// 最終確認 URL
    pub finalize: String,
    /// 憑證 URL（僅在有效時存在）
    #[serde(default)]
    pub certificate: Option<String>,
    /// 訂單失敗時 CA 附上的問題文件
    #[serde(default)]
    pub error: Option<Value>,
    /// 伺服器回傳的訂單 URL
    #[serde(skip)]
    pub url: String,
    #[serde(skip)]
    raw: Value,
}

impl Order {
    /// 為 `domains` 建立新訂單。
    ///
    /// 訂單 URL 取自回應的 `Location` 標頭，之後的輪詢都以它為目標。
    ///
    /// # 參數
    ///
    /// - `session`: 已完成帳戶註冊的工作階段，請求以 `kid` 簽名
    /// - `domains`: 要申請的網域集合，每個網域對應一個 `dns` 識別符
    ///
    /// # 回傳
    ///
    /// 回傳新的 `Order` 實例；回應缺少 `Location` 標頭時回傳協議錯誤。
    ///
    /// # 範例
    ///
    /// ```no_run
    /// use racme_tiny::{csr::Csr, order::Order, session::Session};
    ///
    /// fn place(session: &mut Session, csr: &Csr) -> racme_tiny::Result<Order> {
    ///     let order = Order::create(session, csr.domains())?;
    ///     println!("{} authorizations", order.authorizations.len());
    ///     Ok(order)
    /// }
    /// ```
    pub fn create(session: &mut Session, domains: &DomainSet) -> Result<Self> {
        let new_order_url = session.directory().new_order.clone();
        let response = session.post(&new_order_url, &NewOrderPayload::new(domains))?;
        let url = response
            .location()
            .ok_or_else(|| Error::protocol(&new_order_url, "Location header not found"))?
            .to_owned();

        let mut order = Self::from_response(&response)?;
        order.url = url;
        info!("Order created: {}", order.url);
        Ok(order)
    }

    /// 提交 DER 編碼的 CSR 以完成下訂。
    ///
    /// 回應若是訂單文件，會直接更新本地狀態；否則保留原狀，交由 [`Order::poll`] 取得最新狀態。
    ///
    /// # 參數
    ///
    /// - `session`: 已完成帳戶註冊的工作階段
    /// - `csr_der`: DER 編碼的 CSR，送出前會轉為 base64url
    pub fn finalize(&mut self, session: &mut Session, csr_der: &[u8]) -> Result<()> {
        let response = session.post(&self.finalize, &FinalizeOrderPayload::new(csr_der))?;
        if let Ok(updated) = Self::from_response(&response) {
            self.update(updated);
        }
        Ok(())
    }

    /// 輪詢訂單直到離開 pending 與 processing。
    ///
    /// # 參數
    ///
    /// - `session`: 已完成帳戶註冊的工作階段
    /// - `clock`: 時間來源
    /// - `policy`: 輪詢間隔與時間上限
    ///
    /// # Errors
    ///
    /// 最終狀態不是 valid，或 valid 訂單缺少憑證 URL 時回傳 [`Error::OrderFailed`]。
    pub fn poll(
        &mut self,
        session: &mut Session,
        clock: &dyn Clock,
        policy: &PollPolicy,
    ) -> Result<()> {
        let url = self.url.clone();
        let settled: Self = poll_until_settled(session, clock, policy, &url)?;
        self.update(settled);

        if self.status != OrderStatus::Valid || self.certificate.is_none() {
            return Err(Error::OrderFailed {
                order: self.raw.clone(),
            });
        }
        Ok(())
    }

    /// 以 POST-as-GET 下載 PEM 憑證鏈。
    ///
    /// # 回傳
    ///
    /// 回傳未經解析的 [`Certificate`]；訂單尚無憑證 URL 時回傳 [`Error::OrderFailed`]。
    pub fn download_certificate(&self, session: &mut Session) -> Result<Certificate> {
        let url = self.certificate.as_deref().ok_or_else(|| Error::OrderFailed {
            order: self.raw.clone(),
        })?;
        let response = session.post_as_get(url)?;
        Ok(Certificate::new(response.text()))
    }

    /// CA 最後一次回傳的訂單內容，保留未知欄位，錯誤回報時原樣附上。
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    fn update(&mut self, updated: Self) {
        let url = std::mem::take(&mut self.url);
        *self = Self { url, ..updated };
    }
}

impl Pollable for Order {
    fn is_pending(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::Processing)
    }

    fn from_response(response: &HttpResponse) -> Result<Self> {
        let mut order: Self = response.parse()?;
        order.raw = response.json().unwrap_or_default();
        Ok(order)
    }
}
