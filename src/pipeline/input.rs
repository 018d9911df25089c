//! Input resolution: turn a user-supplied path or URL into script bytes.
//!
//! Scripts are small enough to hold in memory, so unlike a rendering
//! pipeline there is no need to stage downloads on disk: both local files and
//! URLs resolve to a [`ScriptSource`] carrying the bytes, a filename (for
//! format detection) and the declared content type when one is known.

use crate::error::SceneSplitError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// A script payload ready for text extraction.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    /// Original filename, used for format detection and project records.
    pub filename: String,
    /// Declared content type (multipart field or HTTP header), if any.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ScriptSource {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Reject payloads above the configured upload limit.
pub fn check_size(size: usize, max: usize) -> Result<(), SceneSplitError> {
    if size > max {
        return Err(SceneSplitError::FileTooLarge { size, max });
    }
    Ok(())
}

/// Resolve the input string to script bytes.
///
/// If the input is a URL, download it; otherwise read the local file.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
    max_size: usize,
) -> Result<ScriptSource, SceneSplitError> {
    if is_url(input) {
        download_url(input, timeout_secs, max_size).await
    } else {
        resolve_local(input, max_size).await
    }
}

async fn resolve_local(path_str: &str, max_size: usize) -> Result<ScriptSource, SceneSplitError> {
    let path = PathBuf::from(path_str);

    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|e| io_error(e, &path))?;
    check_size(meta.len() as usize, max_size)?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| io_error(e, &path))?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path_str.to_string());

    debug!("Read local script: {} ({} bytes)", path.display(), bytes.len());
    Ok(ScriptSource::new(filename, bytes))
}

fn io_error(e: std::io::Error, path: &std::path::Path) -> SceneSplitError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => SceneSplitError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => SceneSplitError::FileNotFound {
            path: path.to_path_buf(),
        },
    }
}

async fn download_url(
    url: &str,
    timeout_secs: u64,
    max_size: usize,
) -> Result<ScriptSource, SceneSplitError> {
    info!("Downloading script from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SceneSplitError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let to_download_error = |e: reqwest::Error| {
        if e.is_timeout() {
            SceneSplitError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            SceneSplitError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let mut response = client.get(url).send().await.map_err(to_download_error)?;

    if !response.status().is_success() {
        return Err(SceneSplitError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    if let Some(len) = response.content_length() {
        check_size(len as usize, max_size)?;
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // Content-Length is optional; the running total enforces the limit.
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(to_download_error)? {
        check_size(bytes.len() + chunk.len(), max_size)?;
        bytes.extend_from_slice(&chunk);
    }

    info!("Downloaded {} bytes", bytes.len());

    Ok(ScriptSource {
        filename: filename_from_url(url),
        content_type,
        bytes,
    })
}

/// Last path segment if it looks like a filename, else a placeholder.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded-script".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/script.pdf"));
        assert!(is_url("http://example.com/script.fdx"));
        assert!(!is_url("/tmp/script.pdf"));
        assert!(!is_url("script.txt"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(
            filename_from_url("https://example.com/drafts/pilot.fdx?rev=2"),
            "pilot.fdx"
        );
        assert_eq!(filename_from_url("https://example.com/"), "downloaded-script");
    }

    #[test]
    fn size_limit() {
        assert!(check_size(10, 10).is_ok());
        assert!(matches!(
            check_size(11, 10),
            Err(SceneSplitError::FileTooLarge { size: 11, max: 10 })
        ));
    }

    #[tokio::test]
    async fn missing_local_file() {
        let err = resolve_input("/definitely/not/a/script.pdf", 5, 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, SceneSplitError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn local_file_over_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, vec![b'a'; 64]).unwrap();
        let err = resolve_input(path.to_str().unwrap(), 5, 32).await.unwrap_err();
        assert!(matches!(err, SceneSplitError::FileTooLarge { size: 64, max: 32 }));
    }

    /// Serve one HTTP response without Content-Length, then close.
    async fn serve_once(body: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n";
            let _ = socket.write_all(head).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/drafts/pilot.txt")
    }

    #[tokio::test]
    async fn download_without_length_stops_at_limit() {
        let url = serve_once(vec![b'a'; 4096]).await;
        let err = resolve_input(&url, 5, 1024).await.unwrap_err();
        assert!(matches!(err, SceneSplitError::FileTooLarge { max: 1024, .. }));
    }

    #[tokio::test]
    async fn download_without_length_within_limit() {
        let url = serve_once(b"FADE IN:".to_vec()).await;
        let src = resolve_input(&url, 5, 1024).await.unwrap();
        assert_eq!(src.filename, "pilot.txt");
        assert_eq!(src.content_type.as_deref(), Some("text/plain"));
        assert_eq!(src.bytes, b"FADE IN:");
    }

    #[tokio::test]
    async fn local_file_resolves_with_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pilot.txt");
        std::fs::write(&path, "FADE IN:").unwrap();
        let src = resolve_input(path.to_str().unwrap(), 5, 1024).await.unwrap();
        assert_eq!(src.filename, "pilot.txt");
        assert_eq!(src.bytes, b"FADE IN:");
    }
}
