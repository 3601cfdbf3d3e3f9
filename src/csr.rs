use std::{collections::BTreeSet, fs, path::Path};

use openssl::{nid::Nid, x509::X509Req};

use crate::error::{Error, Result};

/// CSR 中宣告的網域集合，不重複且與順序無關。
pub type DomainSet = BTreeSet<String>;

/// 已載入的證書簽名請求。
///
/// 只取出驅動協議所需的欄位：Common Name 與 DNS 類型的主體替代名稱。
pub struct Csr {
    req: X509Req,
    domains: DomainSet,
}

impl Csr {
    /// 從檔案讀取 CSR，接受 PEM 或 DER 格式。
    ///
    /// # 錯誤
    ///
    /// 檔案無法讀取或無法解碼為文字描述時回傳 [`Error::CsrParse`]。
    /// 沒有 CN 或 SAN 並不是錯誤，只會得到空集合。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let with_path = |reason: String| Error::CsrParse {
            path: Some(path.to_path_buf()),
            reason,
        };
        let data = fs::read(path).map_err(|e| with_path(e.to_string()))?;
        Self::parse(&data).map_err(with_path)
    }

    /// 從記憶體中的 PEM 或 DER 位元組建立 CSR。
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::parse(data).map_err(|reason| Error::CsrParse { path: None, reason })
    }

    pub fn domains(&self) -> &DomainSet {
        &self.domains
    }

    /// 匯出 DER 編碼，供 finalize 使用。
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.req.to_der().map_err(|e| Error::CsrParse {
            path: None,
            reason: format!("DER export failed: {}", e),
        })
    }

    fn parse(data: &[u8]) -> std::result::Result<Self, String> {
        let req = X509Req::from_pem(data)
            .or_else(|_| X509Req::from_der(data))
            .map_err(|e| e.to_string())?;
        let text = req.to_text().map_err(|e| e.to_string())?;

        let mut domains = DomainSet::new();
        for entry in req.subject_name().entries_by_nid(Nid::COMMONNAME) {
            if let Ok(cn) = entry.data().to_string() {
                domains.insert(cn);
            }
        }
        domains.extend(san_dns_names(&String::from_utf8_lossy(&text)));

        Ok(Self { req, domains })
    }
}

/// 從請求的文字描述中取出 `X509v3 Subject Alternative Name` 下一行的 DNS 項目。
fn san_dns_names(text: &str) -> Vec<String> {
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        if line.trim_start().starts_with("X509v3 Subject Alternative Name:") {
            return lines
                .next()
                .map(|names| {
                    names
                        .trim()
                        .split(", ")
                        .filter_map(|san| san.strip_prefix("DNS:"))
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default();
        }
    }
    Vec::new()
}
