//! Streaming SHA-256 digests with cooperative cancellation.

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use tokio_util::sync::CancellationToken;

use crate::error::HashError;

/// Bytes read per block before the cancellation token is checked again.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// A lowercase hex SHA-256 digest. Always 64 characters long.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Parse a hex digest, normalizing it to lowercase.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != DIGEST_HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Digest(hex.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The two leading hex digits, which name the partition holding this content.
    pub fn prefix(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Digest {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Digest::from_hex(&value).ok_or_else(|| format!("invalid sha-256 digest: {value:?}"))
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl ToSql for Digest {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for Digest {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Digest::from_hex(text).ok_or_else(|| FromSqlError::Other(format!("invalid digest {text:?}").into()))
    }
}

/// Hash everything `reader` yields, checking `cancel` once per block.
///
/// A cancelled hash returns [`HashError::Cancelled`]; the partial state is discarded.
pub fn hash_reader<R: Read>(
    mut reader: R,
    block_size: usize,
    cancel: &CancellationToken,
) -> Result<Digest, HashError> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0_u8; block_size.max(1)];
    loop {
        if cancel.is_cancelled() {
            return Err(HashError::Cancelled);
        }
        let read = match reader.read(&mut buf) {
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(Digest(hex::encode(hasher.finalize())))
}

/// Hash the file at `path` in blocks of `block_size` bytes.
pub fn hash_file(path: &Path, block_size: usize, cancel: &CancellationToken) -> Result<Digest, HashError> {
    let file = File::open(path)?;
    hash_reader(file, block_size, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // sha256("hello world")
    const HELLO: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn hashes_known_content() {
        let token = CancellationToken::new();
        let digest = hash_reader(Cursor::new(b"hello world"), 4, &token).unwrap();
        assert_eq!(digest.as_str(), HELLO);
        assert_eq!(digest.prefix(), "b9");
    }

    #[test]
    fn block_size_does_not_change_digest() {
        let token = CancellationToken::new();
        let data = vec![7_u8; 10_000];
        let small = hash_reader(Cursor::new(&data), 3, &token).unwrap();
        let large = hash_reader(Cursor::new(&data), DEFAULT_BLOCK_SIZE, &token).unwrap();
        assert_eq!(small, large);
    }

    #[test]
    fn cancelled_token_aborts() {
        let token = CancellationToken::new();
        token.cancel();
        let result = hash_reader(Cursor::new(b"hello world"), 4, &token);
        assert!(matches!(result, Err(HashError::Cancelled)));
    }

    /// Serves `inner` and cancels `token` once the first read returns.
    struct CancelAfterFirstRead<'a> {
        inner: Cursor<Vec<u8>>,
        token: &'a CancellationToken,
        served: usize,
    }

    impl Read for CancelAfterFirstRead<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let read = self.inner.read(buf)?;
            self.served += read;
            self.token.cancel();
            Ok(read)
        }
    }

    #[test]
    fn cancellation_between_blocks_aborts() {
        let token = CancellationToken::new();
        let mut reader = CancelAfterFirstRead {
            inner: Cursor::new(vec![1_u8; 1024]),
            token: &token,
            served: 0,
        };

        let result = hash_reader(&mut reader, 16, &token);
        assert!(matches!(result, Err(HashError::Cancelled)));
        assert!(reader.served > 0);
        assert!(reader.served < 1024);
    }

    /// Fails with `Interrupted` on every other read.
    struct Flaky {
        inner: Cursor<&'static [u8]>,
        interrupt: bool,
    }

    impl Read for Flaky {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let reader = Flaky {
            inner: Cursor::new(b"hello world"),
            interrupt: false,
        };
        let digest = hash_reader(reader, 4, &CancellationToken::new()).unwrap();
        assert_eq!(digest.as_str(), HELLO);
    }

    #[test]
    fn hash_file_matches_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello world").unwrap();

        let digest = hash_file(&path, DEFAULT_BLOCK_SIZE, &CancellationToken::new()).unwrap();
        assert_eq!(digest.as_str(), HELLO);
    }

    #[test]
    fn rejects_malformed_digests() {
        assert!(Digest::from_hex("abc").is_none());
        assert!(Digest::from_hex(&"z".repeat(64)).is_none());
        let upper = Digest::from_hex(&HELLO.to_uppercase()).unwrap();
        assert_eq!(upper.as_str(), HELLO);
    }
}
