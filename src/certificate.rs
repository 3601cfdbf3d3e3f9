use std::fmt;

/// CA 簽發的 PEM 憑證鏈，內容原樣保留。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pem: String,
}

impl Certificate {
    /// 以 CA 回傳的內容建立，不做任何解析。
    pub fn new(pem: impl Into<String>) -> Self {
        Certificate { pem: pem.into() }
    }

    /// PEM 文字，包含完整的憑證鏈。
    pub fn pem(&self) -> &str {
        &self.pem
    }

    /// 供寫入檔案的位元組。
    pub fn as_bytes(&self) -> &[u8] {
        self.pem.as_bytes()
    }

    /// 取出 PEM 文字。
    pub fn into_pem(self) -> String {
        self.pem
    }
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pem)
    }
}
