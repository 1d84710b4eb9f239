//! CRC32 content checksums.
//!
//! A fast non-cryptographic hash is enough to tell a silently corrupted
//! copy from a good one; it is not a tamper check.

use std::path::Path;

use tokio::io::AsyncReadExt;

use vaultkeeper_core::result::AppResult;

/// CRC32 of an in-memory buffer.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// CRC32 of a file, read in 64 KiB chunks.
pub async fn file_crc32(path: &Path) -> AppResult<u32> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_checksum_matches_buffer_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cv.pdf");
        let data = vec![7u8; 200_000];
        tokio::fs::write(&path, &data).await.unwrap();

        assert_eq!(file_crc32(&path).await.unwrap(), crc32(&data));
        assert_ne!(crc32(b"abc"), crc32(b"abd"));
    }
}
