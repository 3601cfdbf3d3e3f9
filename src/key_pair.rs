use std::{fs, path::Path};

use openssl::{
    bn::BigNum,
    hash::MessageDigest,
    pkey::{Id, PKey, Private},
    rsa::Rsa,
    sign,
};

use crate::{
    error::{Error, Result},
    jwk::Jwk,
    signature::Signer,
};

/// ACME 帳戶金鑰，目前僅支援 RSA。
///
/// 私鑰只透過 [`Signer`] 能力對外提供，簽名請求層看不到金鑰本身。
pub struct AccountKey {
    pri_key: PKey<Private>,
    jwk: Jwk,
}

impl AccountKey {
    /// 從 PEM 檔案讀取帳戶私鑰。
    ///
    /// # 錯誤
    ///
    /// 檔案無法讀取、不是私鑰或不是 RSA 金鑰時回傳 [`Error::KeyParse`]。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let pem = fs::read(path).map_err(|e| key_error(Some(path), e))?;
        Self::parse(&pem).map_err(|reason| Error::KeyParse {
            path: Some(path.to_path_buf()),
            reason,
        })
    }

    /// 從 PEM 位元組建立帳戶金鑰。
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        Self::parse(pem).map_err(|reason| Error::KeyParse { path: None, reason })
    }

    /// 產生新的 RSA 金鑰，`bits` 未指定時為 2048。
    pub fn generate(bits: Option<u32>) -> Result<Self> {
        let rsa = Rsa::generate(bits.unwrap_or(2048)).map_err(|e| key_error(None, e))?;
        let pri_key = PKey::from_rsa(rsa).map_err(|e| key_error(None, e))?;
        Self::from_private_key(pri_key).map_err(|reason| Error::KeyParse { path: None, reason })
    }

    /// 以 PKCS#8 PEM 匯出私鑰。
    pub fn to_pem(&self) -> Result<Vec<u8>> {
        self.pri_key
            .private_key_to_pem_pkcs8()
            .map_err(|e| key_error(None, e))
    }

    fn parse(pem: &[u8]) -> std::result::Result<Self, String> {
        let pri_key = PKey::private_key_from_pem(pem).map_err(|e| e.to_string())?;
        Self::from_private_key(pri_key)
    }

    fn from_private_key(pri_key: PKey<Private>) -> std::result::Result<Self, String> {
        if pri_key.id() != Id::RSA {
            return Err(format!("unsupported key type {:?}, expected RSA", pri_key.id()));
        }
        let rsa = pri_key.rsa().map_err(|e| e.to_string())?;
        let jwk = Jwk::rsa(&rsa.n().to_vec(), &rsa.e().to_vec());
        Ok(Self { pri_key, jwk })
    }
}

impl Signer for AccountKey {
    fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        // RSA 金鑰預設使用 PKCS#1 v1.5 填充
        let mut signer = sign::Signer::new(MessageDigest::sha256(), &self.pri_key)
            .map_err(|e| Error::Signing(e.to_string()))?;
        signer
            .update(data)
            .map_err(|e| Error::Signing(e.to_string()))?;
        signer
            .sign_to_vec()
            .map_err(|e| Error::Signing(e.to_string()))
    }
}

impl std::fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountKey").field("jwk", &self.jwk).finish()
    }
}

/// 從 `openssl rsa -noout -text` 的文字描述中取出的 RSA 公開參數。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaComponents {
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
}

impl RsaComponents {
    /// 解析金鑰的文字描述。
    ///
    /// 模數為 `modulus:` 之後以冒號分隔的十六進位區塊，指數為
    /// `publicExponent:` 之後的十進位數字。
    ///
    /// # 錯誤
    ///
    /// 找不到任一欄位時回傳 [`Error::KeyParse`]。
    pub fn from_text(text: &str) -> Result<Self> {
        let parse_error = |reason: &str| Error::KeyParse {
            path: None,
            reason: reason.to_owned(),
        };

        let modulus_start = text
            .find("modulus:")
            .ok_or_else(|| parse_error("modulus not found"))?
            + "modulus:".len();
        let exponent_start = text[modulus_start..]
            .find("publicExponent:")
            .ok_or_else(|| parse_error("publicExponent not found"))?
            + modulus_start;

        let modulus_hex: String = text[modulus_start..exponent_start]
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .collect();
        if modulus_hex.is_empty() {
            return Err(parse_error("modulus is empty"));
        }
        let modulus = BigNum::from_hex_str(&modulus_hex)
            .map_err(|e| parse_error(&format!("invalid modulus: {}", e)))?;

        let exponent_dec: String = text[exponent_start + "publicExponent:".len()..]
            .trim_start()
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        if exponent_dec.is_empty() {
            return Err(parse_error("publicExponent is empty"));
        }
        let exponent = BigNum::from_dec_str(&exponent_dec)
            .map_err(|e| parse_error(&format!("invalid publicExponent: {}", e)))?;

        Ok(Self {
            modulus: modulus.to_vec(),
            exponent: exponent.to_vec(),
        })
    }

    pub fn to_jwk(&self) -> Jwk {
        Jwk::rsa(&self.modulus, &self.exponent)
    }
}

fn key_error(path: Option<&Path>, err: impl std::fmt::Display) -> Error {
    Error::KeyParse {
        path: path.map(Path::to_path_buf),
        reason: err.to_string(),
    }
}
