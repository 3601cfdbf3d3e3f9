//! 簽名能力的抽象，以及以外部 `openssl` 程序實作的簽名器。

use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use crate::{
    error::{Error, Result},
    jwk::Jwk,
    key_pair::RsaComponents,
};

/// 定義簽名請求所需的簽名能力。
///
/// 實作者需提供對應的 JWK 以及 RS256（SHA-256 + RSA PKCS#1 v1.5）簽名。
pub trait Signer: Send + Sync {
    /// JWS 保護頭中的 `alg`。
    fn alg(&self) -> &str {
        "RS256"
    }

    /// 對應的公開金鑰。
    fn jwk(&self) -> &Jwk;

    /// 對任意位元組簽名。
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// 透過呼叫 `openssl` 命令列簽名，私鑰不會載入本程序。
#[derive(Debug)]
pub struct OpensslCommandSigner {
    key_path: PathBuf,
    jwk: Jwk,
}

impl OpensslCommandSigner {
    /// 以 `openssl rsa -noout -text` 讀出公開參數並建立簽名器。
    pub fn new(key_path: impl AsRef<Path>) -> Result<Self> {
        let key_path = key_path.as_ref().to_path_buf();
        let output = Command::new("openssl")
            .arg("rsa")
            .arg("-in")
            .arg(&key_path)
            .args(["-noout", "-text"])
            .output()
            .map_err(|e| Error::KeyParse {
                path: Some(key_path.clone()),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(Error::KeyParse {
                path: Some(key_path),
                reason: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let jwk = RsaComponents::from_text(&text)
            .map_err(|e| match e {
                Error::KeyParse { reason, .. } => Error::KeyParse {
                    path: Some(key_path.clone()),
                    reason,
                },
                other => other,
            })?
            .to_jwk();

        Ok(Self { key_path, jwk })
    }
}

impl Signer for OpensslCommandSigner {
    fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut child = Command::new("openssl")
            .args(["dgst", "-sha256", "-sign"])
            .arg(&self.key_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Signing(e.to_string()))?;

        child
            .stdin
            .take()
            .ok_or_else(|| Error::Signing("openssl stdin unavailable".to_owned()))?
            .write_all(data)
            .map_err(|e| Error::Signing(e.to_string()))?;

        let output = child
            .wait_with_output()
            .map_err(|e| Error::Signing(e.to_string()))?;
        if !output.status.success() {
            return Err(Error::Signing(format!(
                "OpenSSL Error\n{}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(output.stdout)
    }
}

/// 組合 JWS 的簽名輸入 `protected64.payload64` 並簽名，回傳 base64url 字串。
pub fn create_signature(signer: &dyn Signer, header_b64: &str, payload_b64: &str) -> Result<String> {
    let signing_input = format!("{}.{}", header_b64, payload_b64);
    let signature = signer.sign(signing_input.as_bytes())?;
    Ok(crate::base64::encode(signature))
}
