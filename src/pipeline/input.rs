//! Input resolution: normalise a user-supplied path or URL to a local file
//! and decide whether it is a PDF or an image.
//!
//! URL inputs are downloaded into a `TempDir` that lives as long as the
//! returned [`ResolvedInput`], so the file disappears once the batch is done
//! even if the process panics.

use crate::config::InputKind;
use crate::error::WorkoutError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input — either a local path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the file was downloaded to a temp directory.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// What a single input file turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Image,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local file path.
///
/// If the input is a URL, download it to a temporary directory.
/// If the input is a local file, validate it exists and is readable.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, WorkoutError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, WorkoutError> {
    let path = PathBuf::from(path_str);

    if !path.is_file() {
        return Err(WorkoutError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(WorkoutError::PermissionDenied { path });
        }
        Err(_) => return Err(WorkoutError::FileNotFound { path }),
    }

    debug!("Resolved local input: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, WorkoutError> {
    info!("Downloading input from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| WorkoutError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            WorkoutError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            WorkoutError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(WorkoutError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| WorkoutError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| WorkoutError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| WorkoutError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last URL path segment if it looks like a file name, else a placeholder.
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

    "downloaded".to_string()
}

/// Decide how to treat `path` under the batch-wide `declared` kind.
///
/// A declared PDF must start with `%PDF`. A declared image is not checked
/// here; the decoder rejects it later if it is not one.
pub fn classify(path: &Path, declared: InputKind) -> Result<SourceKind, WorkoutError> {
    match declared {
        InputKind::Pdf => {
            let magic = read_magic(path)?;
            if &magic[..4] != b"%PDF" {
                let mut head = [0u8; 4];
                head.copy_from_slice(&magic[..4]);
                return Err(WorkoutError::NotAPdf {
                    path: path.to_path_buf(),
                    magic: head,
                });
            }
            Ok(SourceKind::Pdf)
        }
        InputKind::Image => Ok(SourceKind::Image),
        InputKind::Auto => {
            let magic = read_magic(path)?;
            if let Some(kind) = sniff(&magic) {
                return Ok(kind);
            }
            from_extension(path).ok_or_else(|| WorkoutError::UnsupportedInput {
                path: path.to_path_buf(),
                reason: "not a PDF, PNG or JPEG (use --file-type to force one)".into(),
            })
        }
    }
}

fn read_magic(path: &Path) -> Result<[u8; 8], WorkoutError> {
    let mut f = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => WorkoutError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => WorkoutError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;
    let mut magic = [0u8; 8];
    // Short files leave the tail zeroed, which matches nothing.
    let mut filled = 0;
    while filled < magic.len() {
        match f.read(&mut magic[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(WorkoutError::Internal(format!("read {}: {e}", path.display()))),
        }
    }
    Ok(magic)
}

fn sniff(magic: &[u8; 8]) -> Option<SourceKind> {
    if magic.starts_with(b"%PDF") {
        Some(SourceKind::Pdf)
    } else if magic.starts_with(b"\x89PNG\r\n\x1a\n") || magic.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(SourceKind::Image)
    } else {
        None
    }
}

fn from_extension(path: &Path) -> Option<SourceKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(SourceKind::Pdf),
        "png" | "jpg" | "jpeg" => Some(SourceKind::Image),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let p = dir.path().join(name);
        std::fs::File::create(&p).unwrap().write_all(bytes).unwrap();
        p
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/log.pdf"));
        assert!(is_url("http://example.com/log.jpg"));
        assert!(!is_url("/tmp/log.pdf"));
        assert!(!is_url("log.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_takes_last_segment() {
        assert_eq!(filename_from_url("https://x.io/a/week1.pdf"), "week1.pdf");
        assert_eq!(filename_from_url("https://x.io/a/"), "downloaded");
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = resolve_local("/definitely/not/here.pdf").err().unwrap();
        assert!(matches!(err, WorkoutError::FileNotFound { .. }));
    }

    #[test]
    fn auto_sniffs_magic_bytes_over_extension() {
        let dir = TempDir::new().unwrap();
        let pdf = write_temp(&dir, "scan.bin", b"%PDF-1.7\n");
        let png = write_temp(&dir, "photo.pdf", b"\x89PNG\r\n\x1a\n....");
        let jpg = write_temp(&dir, "photo", &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0]);

        assert_eq!(classify(&pdf, InputKind::Auto).unwrap(), SourceKind::Pdf);
        assert_eq!(classify(&png, InputKind::Auto).unwrap(), SourceKind::Image);
        assert_eq!(classify(&jpg, InputKind::Auto).unwrap(), SourceKind::Image);
    }

    #[test]
    fn auto_falls_back_to_extension_then_fails() {
        let dir = TempDir::new().unwrap();
        let by_ext = write_temp(&dir, "page.JPG", b"garbage!");
        let unknown = write_temp(&dir, "notes.txt", b"hello");

        assert_eq!(classify(&by_ext, InputKind::Auto).unwrap(), SourceKind::Image);
        assert!(matches!(
            classify(&unknown, InputKind::Auto),
            Err(WorkoutError::UnsupportedInput { .. })
        ));
    }

    #[test]
    fn declared_pdf_requires_pdf_magic() {
        let dir = TempDir::new().unwrap();
        let png = write_temp(&dir, "log.pdf", b"\x89PNG\r\n\x1a\n");
        assert!(matches!(
            classify(&png, InputKind::Pdf),
            Err(WorkoutError::NotAPdf { .. })
        ));
    }

    #[test]
    fn declared_image_is_not_sniffed() {
        let dir = TempDir::new().unwrap();
        let anything = write_temp(&dir, "x.dat", b"%PDF-1.4");
        assert_eq!(classify(&anything, InputKind::Image).unwrap(), SourceKind::Image);
    }
}
