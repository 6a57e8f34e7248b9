use std::io;
use std::path::Path;

use md5::Context as Md5Context;
use sha2::{Digest, Sha512};
use tokio::io::AsyncReadExt;

const READ_BUFFER: usize = 32 * 1024;

/// Digest algorithm, chosen by the length of the expected hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Md5,
    Sha512,
}

impl ChecksumKind {
    pub fn for_digest(hex: &str) -> Option<Self> {
        match hex.len() {
            32 => Some(ChecksumKind::Md5),
            128 => Some(ChecksumKind::Sha512),
            _ => None,
        }
    }

    pub fn hasher(self) -> Hasher {
        match self {
            ChecksumKind::Md5 => Hasher::Md5(Md5Context::new()),
            ChecksumKind::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }
}

pub enum Hasher {
    Md5(Md5Context),
    Sha512(Sha512),
}

impl Hasher {
    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            Hasher::Md5(ctx) => ctx.consume(chunk),
            Hasher::Sha512(ctx) => ctx.update(chunk),
        }
    }

    /// Lowercase hex digest.
    pub fn finish(self) -> String {
        match self {
            Hasher::Md5(ctx) => format!("{:x}", ctx.compute()),
            Hasher::Sha512(ctx) => format!("{:x}", ctx.finalize()),
        }
    }
}

/// Hex digest of the file at `path`.
pub async fn file_checksum(path: &Path, kind: ChecksumKind) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = kind.hasher();
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.finish())
}

/// Whether the file at `path` has exactly `size` bytes and hashes to
/// `expected`. Missing files and digests of unknown length never match.
pub async fn file_matches(path: &Path, expected: &str, size: u64) -> io::Result<bool> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if !metadata.is_file() || metadata.len() != size {
        return Ok(false);
    }
    let Some(kind) = ChecksumKind::for_digest(expected) else {
        return Ok(false);
    };
    Ok(file_checksum(path, kind).await?.eq_ignore_ascii_case(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ABC_MD5: &str = "900150983cd24fb0d6963f7d28e17f72";
    const ABC_SHA512: &str = "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f";

    #[test]
    fn picks_algorithm_by_length() {
        assert_eq!(ChecksumKind::for_digest(ABC_MD5), Some(ChecksumKind::Md5));
        assert_eq!(
            ChecksumKind::for_digest(ABC_SHA512),
            Some(ChecksumKind::Sha512)
        );
        assert_eq!(ChecksumKind::for_digest(""), None);
        assert_eq!(ChecksumKind::for_digest("abcd"), None);
    }

    #[tokio::test]
    async fn hashes_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(
            file_checksum(&path, ChecksumKind::Md5).await.unwrap(),
            ABC_MD5
        );
        assert_eq!(
            file_checksum(&path, ChecksumKind::Sha512).await.unwrap(),
            ABC_SHA512
        );
    }

    #[tokio::test]
    async fn matches_requires_size_and_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();

        assert!(file_matches(&path, ABC_MD5, 3).await.unwrap());
        assert!(file_matches(&path, &ABC_SHA512.to_uppercase(), 3).await.unwrap());
        assert!(!file_matches(&path, ABC_MD5, 4).await.unwrap());
        assert!(!file_matches(&path, "", 3).await.unwrap());
        assert!(!file_matches(&dir.path().join("missing"), ABC_MD5, 3).await.unwrap());
    }
}
