use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::write::GzDecoder;
use futures_util::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

use super::checksum::{ChecksumKind, Hasher};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("concurrency limiter is closed")]
    ConcurrencyClosed,
    #[error("checksum `{0}` has no known algorithm")]
    UnknownChecksum(String),
    #[error("download integrity check failed: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("download size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
}

/// What a finished download must look like. An empty checksum skips the
/// digest check.
#[derive(Debug, Clone, Copy)]
pub struct Expected<'a> {
    pub checksum: &'a str,
    pub size: u64,
}

#[derive(Clone)]
pub struct TransferClient {
    http: Client,
    download_limit: Arc<Semaphore>,
}

impl TransferClient {
    pub fn new(http: Client, download_concurrency: usize) -> Self {
        Self {
            http,
            download_limit: Arc::new(Semaphore::new(download_concurrency.max(1))),
        }
    }

    /// Streams `href` into `target` through a `.partial` sibling, inflating
    /// gzip bodies on the fly. The target only appears once the body passed
    /// verification. Returns the number of bytes written.
    pub async fn download_to_path(
        &self,
        href: &str,
        target: &Path,
        gzip: bool,
        expected: Option<Expected<'_>>,
    ) -> Result<u64, TransferError> {
        let _permit = self.permit().await?;
        let mut hasher = match expected {
            Some(expected) if !expected.checksum.is_empty() => Some(
                ChecksumKind::for_digest(expected.checksum)
                    .ok_or_else(|| TransferError::UnknownChecksum(expected.checksum.to_string()))?
                    .hasher(),
            ),
            _ => None,
        };

        let url = Url::parse(href)?;
        let response = self.http.get(url).send().await?.error_for_status()?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut inflater = gzip.then(|| GzDecoder::new(Vec::new()));
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        let result: Result<(), TransferError> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                let data = match inflater.as_mut() {
                    Some(decoder) => {
                        decoder.write_all(&chunk)?;
                        std::mem::take(decoder.get_mut())
                    }
                    None => chunk.to_vec(),
                };
                write_chunk(&mut file, &mut hasher, &mut written, &data).await?;
            }
            if let Some(decoder) = inflater.take() {
                let rest = decoder.finish()?;
                write_chunk(&mut file, &mut hasher, &mut written, &rest).await?;
            }
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            verify(expected, hasher, written)
        }
        .await;

        if let Err(err) = result {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err);
        }

        tokio::fs::rename(&partial, target).await?;
        Ok(written)
    }

    /// Fetches a small document into memory.
    pub async fn fetch_bytes(&self, href: &str, gzip: bool) -> Result<Vec<u8>, TransferError> {
        let _permit = self.permit().await?;
        let url = Url::parse(href)?;
        let body = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        if !gzip {
            return Ok(body.to_vec());
        }
        let mut decoder = GzDecoder::new(Vec::new());
        decoder.write_all(&body)?;
        Ok(decoder.finish()?)
    }

    async fn permit(&self) -> Result<OwnedSemaphorePermit, TransferError> {
        self.download_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransferError::ConcurrencyClosed)
    }
}

async fn write_chunk(
    file: &mut tokio::fs::File,
    hasher: &mut Option<Hasher>,
    written: &mut u64,
    data: &[u8],
) -> Result<(), TransferError> {
    if data.is_empty() {
        return Ok(());
    }
    file.write_all(data).await?;
    if let Some(hasher) = hasher.as_mut() {
        hasher.update(data);
    }
    *written += data.len() as u64;
    Ok(())
}

fn verify(
    expected: Option<Expected<'_>>,
    hasher: Option<Hasher>,
    written: u64,
) -> Result<(), TransferError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    if written != expected.size {
        return Err(TransferError::SizeMismatch {
            expected: expected.size,
            actual: written,
        });
    }
    if let Some(hasher) = hasher {
        let actual = hasher.finish();
        if !actual.eq_ignore_ascii_case(expected.checksum) {
            return Err(TransferError::ChecksumMismatch {
                expected: expected.checksum.to_ascii_lowercase(),
                actual,
            });
        }
    }
    Ok(())
}

pub(crate) fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    async fn serve(body: Vec<u8>) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;
        server
    }

    fn gzipped(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn downloads_and_verifies() {
        let server = serve(b"hello".to_vec()).await;
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested/out.jar");
        let client = TransferClient::new(Client::new(), 2);

        let written = client
            .download_to_path(
                &format!("{}/file", server.uri()),
                &target,
                false,
                Some(Expected {
                    checksum: HELLO_MD5,
                    size: 5,
                }),
            )
            .await
            .unwrap();

        assert_eq!(written, 5);
        assert_eq!(std::fs::read(&target).unwrap(), b"hello");
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn inflates_gzip_bodies() {
        let server = serve(gzipped(b"hello")).await;
        let dir = tempdir().unwrap();
        let target = dir.path().join("out.txt");
        let client = TransferClient::new(Client::new(), 1);

        client
            .download_to_path(
                &format!("{}/file", server.uri()),
                &target,
                true,
                Some(Expected {
                    checksum: HELLO_MD5,
                    size: 5,
                }),
            )
            .await
            .unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn checksum_mismatch_leaves_no_file() {
        let server = serve(b"hello".to_vec()).await;
        let dir = tempdir().unwrap();
        let target = dir.path().join("bad.txt");
        let client = TransferClient::new(Client::new(), 1);

        let err = client
            .download_to_path(
                &format!("{}/file", server.uri()),
                &target,
                false,
                Some(Expected {
                    checksum: "00000000000000000000000000000000",
                    size: 5,
                }),
            )
            .await
            .expect_err("expected checksum mismatch");

        assert!(matches!(err, TransferError::ChecksumMismatch { .. }));
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn size_mismatch_is_rejected() {
        let server = serve(b"hello".to_vec()).await;
        let dir = tempdir().unwrap();
        let target = dir.path().join("short.txt");
        let client = TransferClient::new(Client::new(), 1);

        let err = client
            .download_to_path(
                &format!("{}/file", server.uri()),
                &target,
                false,
                Some(Expected {
                    checksum: HELLO_MD5,
                    size: 6,
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransferError::SizeMismatch {
                expected: 6,
                actual: 5
            }
        ));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn http_errors_fail_the_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let dir = tempdir().unwrap();
        let target = dir.path().join("missing.txt");
        let client = TransferClient::new(Client::new(), 1);

        let err = client
            .download_to_path(&format!("{}/missing", server.uri()), &target, false, None)
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Request(_)));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn fetches_gzip_documents_into_memory() {
        let server = serve(gzipped(b"document")).await;
        let client = TransferClient::new(Client::new(), 1);

        let body = client
            .fetch_bytes(&format!("{}/file", server.uri()), true)
            .await
            .unwrap();

        assert_eq!(body, b"document");
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/repo/ab/abc.jar")),
            PathBuf::from("/repo/ab/abc.jar.partial")
        );
    }
}
