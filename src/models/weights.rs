//! Remote model weights: identification, download and integrity checks.

use crate::core::errors::DetectorError;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// A weight file identified by name, source URL and SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ModelWeights {
    /// File name inside the model directory.
    pub file_name: String,
    /// Download location.
    pub url: String,
    /// Hex SHA-256 of the file. Lowercased when built with [`ModelWeights::new`]
    /// or deserialized; compared without regard to case.
    #[serde(deserialize_with = "lowercase_hex")]
    pub sha256: String,
}

fn lowercase_hex<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let hex = <String as serde::Deserialize>::deserialize(deserializer)?;
    Ok(hex.to_ascii_lowercase())
}

impl ModelWeights {
    pub fn new(
        file_name: impl Into<String>,
        url: impl Into<String>,
        sha256: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            url: url.into(),
            sha256: sha256.into().to_ascii_lowercase(),
        }
    }

    fn matches(&self, digest: &str) -> bool {
        digest.eq_ignore_ascii_case(&self.sha256)
    }

    /// Weights of the oriented speech-bubble detector.
    pub fn yolo_obb() -> Self {
        Self::new(
            "ysgyolo_1.2_OS1.0.onnx",
            "https://github.com/hgmzhn/manga-translator-ui/releases/download/v1.7.1/ysgyolo_1.2_OS1.0.onnx",
            "6f3202925f01fdf045f8c31a3bf62e6c44944f56ce09107eb436bc5a5b185ebe",
        )
    }

    /// Where the file lives inside `dir`.
    pub fn local_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.file_name)
    }
}

/// Downloads a URL to a local file.
pub trait WeightFetcher: Send + Sync + std::fmt::Debug {
    /// Writes the content at `url` to `dest`, replacing anything there.
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), DetectorError>;
}

/// [`WeightFetcher`] over blocking HTTP.
#[derive(Debug, Clone)]
pub struct HttpWeightFetcher {
    timeout: Duration,
}

impl Default for HttpWeightFetcher {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
        }
    }
}

impl HttpWeightFetcher {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl WeightFetcher for HttpWeightFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), DetectorError> {
        let fetch_err = |reason: String| DetectorError::WeightFetch {
            url: url.to_string(),
            reason,
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| fetch_err(format!("failed to build HTTP client: {e}")))?;
        let mut response = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| fetch_err(e.to_string()))?;

        let total = response.content_length();
        info!(
            "Downloading {} ({})",
            url,
            total.map_or_else(|| "unknown size".to_string(), |n| format!("{n} bytes"))
        );

        let mut file = File::create(dest)?;
        let mut buf = vec![0u8; 64 * 1024];
        let mut written: u64 = 0;
        loop {
            let n = response
                .read(&mut buf)
                .map_err(|e| fetch_err(format!("read failed after {written} bytes: {e}")))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
            written += n as u64;
        }
        file.flush()?;

        if let Some(expected) = total
            && expected != written
        {
            return Err(fetch_err(format!(
                "truncated download: expected {expected} bytes, got {written}"
            )));
        }
        Ok(())
    }
}

/// Lowercase hex SHA-256 of a file, streamed.
pub fn sha256_file(path: &Path) -> Result<String, DetectorError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Returns the local path of `weights` inside `dir`, downloading it when
/// missing or when the existing file fails the digest check.
///
/// The download goes to a `.part` file that is renamed into place only after
/// its digest matches.
pub fn ensure_weights(
    dir: &Path,
    weights: &ModelWeights,
    fetcher: &dyn WeightFetcher,
) -> Result<PathBuf, DetectorError> {
    let path = weights.local_path(dir);
    if path.is_file() {
        let actual = sha256_file(&path)?;
        if weights.matches(&actual) {
            return Ok(path);
        }
        warn!(
            "{} has digest {}, expected {}; downloading again",
            path.display(),
            actual,
            weights.sha256
        );
        std::fs::remove_file(&path)?;
    }

    std::fs::create_dir_all(dir)?;
    let part = dir.join(format!("{}.part", weights.file_name));
    if let Err(e) = fetcher.fetch(&weights.url, &part) {
        let _ = std::fs::remove_file(&part);
        return Err(e);
    }

    let actual = sha256_file(&part)?;
    if !weights.matches(&actual) {
        let _ = std::fs::remove_file(&part);
        return Err(DetectorError::ChecksumMismatch {
            file: weights.file_name.clone(),
            expected: weights.sha256.clone(),
            actual,
        });
    }

    std::fs::rename(&part, &path)?;
    info!("Saved {} to {}", weights.file_name, path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct StaticFetcher {
        body: Vec<u8>,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        fn new(body: &[u8]) -> Self {
            Self {
                body: body.to_vec(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl WeightFetcher for StaticFetcher {
        fn fetch(&self, _url: &str, dest: &Path) -> Result<(), DetectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::write(dest, &self.body)?;
            Ok(())
        }
    }

    fn digest(bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }

    fn weights_for(body: &[u8]) -> ModelWeights {
        ModelWeights::new("model.onnx", "https://example.invalid/model.onnx", digest(body))
    }

    #[test]
    fn test_downloads_missing_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StaticFetcher::new(b"weights");
        let weights = weights_for(b"weights");

        let path = ensure_weights(dir.path(), &weights, &fetcher).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"weights");
        ensure_weights(dir.path(), &weights, &fetcher).unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(!dir.path().join("model.onnx.part").exists());
    }

    #[test]
    fn test_corrupt_local_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.onnx"), b"garbage").unwrap();
        let fetcher = StaticFetcher::new(b"weights");

        let path = ensure_weights(dir.path(), &weights_for(b"weights"), &fetcher).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"weights");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mismatched_download_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StaticFetcher::new(b"tampered");
        let err = ensure_weights(dir.path(), &weights_for(b"weights"), &fetcher).unwrap_err();
        assert!(matches!(err, DetectorError::ChecksumMismatch { .. }));
        assert!(!dir.path().join("model.onnx").exists());
        assert!(!dir.path().join("model.onnx.part").exists());
    }

    #[test]
    fn test_yolo_obb_weights_identity() {
        let w = ModelWeights::yolo_obb();
        assert_eq!(w.file_name, "ysgyolo_1.2_OS1.0.onnx");
        assert!(w.url.ends_with(&w.file_name));
        assert_eq!(w.sha256.len(), 64);
    }

    #[test]
    fn test_uppercase_digest_reuses_local_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.onnx"), b"weights").unwrap();
        let fetcher = StaticFetcher::new(b"other");
        let upper = digest(b"weights").to_ascii_uppercase();

        let parsed: ModelWeights = toml::from_str(&format!(
            "file_name = \"model.onnx\"\nurl = \"https://example.invalid/model.onnx\"\nsha256 = \"{upper}\"\n"
        ))
        .unwrap();
        assert_eq!(parsed.sha256, digest(b"weights"));
        ensure_weights(dir.path(), &parsed, &fetcher).unwrap();

        let literal = ModelWeights {
            sha256: upper,
            ..parsed
        };
        ensure_weights(dir.path(), &literal, &fetcher).unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read(dir.path().join("model.onnx")).unwrap(), b"weights");
    }
}
