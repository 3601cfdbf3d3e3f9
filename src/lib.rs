//! # ACME 憑證簽發核心
//!
//! 本庫實作 ACME（RFC 8555）客戶端的簽發流程：以既有的 RSA 帳戶私鑰與 CSR，
//! 向 CA（例如 Let's Encrypt）註冊帳戶、建立訂單、完成每個網域的
//! HTTP-01 或 DNS-01 挑戰、提交 CSR，最後下載 PEM 憑證鏈。
//!
//! ## 模組概覽
//!
//! - **協議層**：[`session::Session`] 負責每個簽名請求的 JWS 封裝與 nonce 管理，
//!   並在 CA 回報 badNonce 時有限次重試。
//! - **資源**：[`account`]、[`order`]、[`authorization`] 與 [`challenge`]
//!   對應 CA 端的各項資源。
//! - **挑戰回應器**：[`responder`] 提供 HTTP-01 的檔案佈署與 DNS-01 的 TXT 記錄佈署。
//! - **流程**：[`issuer::Issuer`] 將以上元件串接成一次完整的申請。
//!
//! 所有錯誤都匯集於 [`Error`]；[`Error::category`] 可區分速率限制、網路、
//! 驗證失敗與訂單失敗。
//!
//! ## 示例
//!
//! ```no_run
//! use racme_tiny::{config::ConfigBuilder, issuer::Issuer};
//!
//! fn main() -> Result<(), racme_tiny::Error> {
//!     let config = ConfigBuilder::new("account.key", "domain.csr")
//!         .acme_dir("/var/www/challenges")
//!         .contact(vec!["mailto:admin@example.com".to_string()])
//!         .build()?;
//!
//!     let certificate = Issuer::from_config(config)?.issue()?;
//!     std::fs::write("signed_chain.crt", certificate.as_bytes())?;
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod authorization;
pub mod base64;
pub mod certificate;
pub mod challenge;
pub mod config;
pub mod csr;
pub mod directory;
pub mod error;
pub mod issuer;
pub mod jwk;
pub mod jws;
pub mod key_pair;
pub mod nonce;
pub mod order;
pub mod payload;
pub mod poll;
pub mod protection;
pub mod responder;
pub mod session;
pub mod signature;
pub mod transport;

#[cfg(test)]
mod testing;

pub use error::{Error, ErrorCategory, Result};
