//! Content hashing for stored plaintext.
//!
//! The checksum is SHA-256 rendered as URL-safe base64 without padding, so it
//! can be embedded in object keys and compared across nodes byte for byte.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 64 * 1024;

/// Checksum of an in-memory buffer.
pub fn checksum(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(data))
}

/// Checksum of everything readable from `reader`, hashed incrementally.
pub async fn checksum_reader<R>(mut reader: R) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut digest = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        digest.update(&buf[..n]);
    }
    Ok(URL_SAFE_NO_PAD.encode(digest.finalize()))
}
