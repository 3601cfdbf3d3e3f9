use thiserror::Error;

/// Base64url 解碼時可能發生的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// 遇到字母表以外的字元，包含該字元的 ASCII 值。
    #[error("Invalid character: {0}")]
    InvalidCharacter(u8),

    /// 長度除以 4 餘 1，不可能由任何輸入編碼而來。
    #[error("Invalid length")]
    InvalidLength,
}

// RFC 4648 §5 的 URL 安全字母表
const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// 以 JOSE 規定的格式編碼：URL 安全字母表，且不帶 `=` 填充。
///
/// # 示例
///
/// ```
/// use racme_tiny::base64::encode;
/// assert_eq!(encode("Hello, World!"), "SGVsbG8sIFdvcmxkIQ");
/// assert_eq!(encode([0xFB, 0xFF]), "-_8");
/// ```
pub fn encode<T: AsRef<[u8]>>(input: T) -> String {
    let bytes = input.as_ref();
    let mut output = String::with_capacity((bytes.len() * 4).div_ceil(3));

    for chunk in bytes.chunks(3) {
        let b1 = chunk[0];
        let b2 = chunk.get(1).copied().unwrap_or(0);
        let b3 = chunk.get(2).copied().unwrap_or(0);

        output.push(ALPHABET[(b1 >> 2) as usize] as char);
        output.push(ALPHABET[((b1 & 0x03) << 4 | (b2 >> 4)) as usize] as char);
        if chunk.len() > 1 {
            output.push(ALPHABET[((b2 & 0x0F) << 2 | (b3 >> 6)) as usize] as char);
        }
        if chunk.len() > 2 {
            output.push(ALPHABET[(b3 & 0x3F) as usize] as char);
        }
    }

    output
}

/// 解碼 base64url 字串，容許（並忽略）結尾的 `=` 填充。
///
/// # 錯誤
///
/// 可能返回 [`DecodeError::InvalidCharacter`] 或 [`DecodeError::InvalidLength`]。
pub fn decode(input: &str) -> Result<Vec<u8>, DecodeError> {
    let encoded = input.trim_end_matches('=').as_bytes();
    if encoded.len() % 4 == 1 {
        return Err(DecodeError::InvalidLength);
    }

    let mut buffer = Vec::with_capacity(encoded.len() * 3 / 4);
    for chunk in encoded.chunks(4) {
        let mut group: u32 = 0;
        for (i, &c) in chunk.iter().enumerate() {
            group |= (decode_char(c)? as u32) << (18 - 6 * i);
        }

        buffer.push((group >> 16) as u8);
        if chunk.len() > 2 {
            buffer.push((group >> 8 & 0xFF) as u8);
        }
        if chunk.len() > 3 {
            buffer.push((group & 0xFF) as u8);
        }
    }

    Ok(buffer)
}

fn decode_char(c: u8) -> Result<u8, DecodeError> {
    match c {
        b'A'..=b'Z' => Ok(c - b'A'),
        b'a'..=b'z' => Ok(c - b'a' + 26),
        b'0'..=b'9' => Ok(c - b'0' + 52),
        b'-' => Ok(62),
        b'_' => Ok(63),
        _ => Err(DecodeError::InvalidCharacter(c)),
    }
}
