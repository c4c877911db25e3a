//! Input normalisation: turn every input file into one or more PNG files on
//! disk, in upload order.
//!
//! PDFs are rasterised page by page through pdfium; images are decoded and
//! re-encoded so every downstream stage sees a PNG it can trust the decoder
//! already accepted. Both run inside `spawn_blocking` because pdfium and the
//! image codecs are CPU-bound and synchronous.

use crate::config::ExtractionConfig;
use crate::error::WorkoutError;
use crate::pipeline::input::{self, SourceKind};
use image::{ImageFormat, ImageReader};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The ordered images a batch will send to the model.
///
/// Owns the temp directory the images live in; dropping it removes them.
pub struct NormalizedBatch {
    pub images: Vec<PathBuf>,
    /// Number of input files the images came from.
    pub input_files: usize,
    work_dir: TempDir,
}

impl NormalizedBatch {
    /// Directory holding the normalised images.
    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }
}

/// Normalise every input into image files, preserving input and page order.
///
/// Unsupported or corrupt inputs abort the batch.
pub async fn normalize_inputs(
    inputs: &[String],
    config: &ExtractionConfig,
) -> Result<NormalizedBatch, WorkoutError> {
    if inputs.is_empty() {
        return Err(WorkoutError::NoInputs);
    }

    let work_dir = TempDir::new().map_err(|e| WorkoutError::Internal(e.to_string()))?;
    let mut images = Vec::new();

    for (ordinal, raw) in inputs.iter().enumerate() {
        let resolved = input::resolve_input(raw, config.download_timeout_secs).await?;
        let path = resolved.path().to_path_buf();
        let kind = input::classify(&path, config.input_kind)?;

        let dest_dir = work_dir.path().join(format!("{:03}", ordinal + 1));
        std::fs::create_dir_all(&dest_dir)
            .map_err(|e| WorkoutError::Internal(format!("create {}: {e}", dest_dir.display())))?;

        let produced = match kind {
            SourceKind::Pdf => {
                let password = config.password.clone();
                let max_pixels = config.max_rendered_pixels;
                tokio::task::spawn_blocking(move || {
                    rasterise_pdf(&path, &dest_dir, password.as_deref(), max_pixels)
                })
                .await
                .map_err(|e| WorkoutError::Internal(format!("Render task panicked: {}", e)))??
            }
            SourceKind::Image => {
                let image = tokio::task::spawn_blocking(move || reencode_image(&path, &dest_dir))
                    .await
                    .map_err(|e| WorkoutError::Internal(format!("Image task panicked: {}", e)))??;
                vec![image]
            }
        };

        info!("Input {} ({:?}) → {} image(s)", raw, kind, produced.len());
        images.extend(produced);
    }

    Ok(NormalizedBatch {
        images,
        input_files: inputs.len(),
        work_dir,
    })
}

/// Bind pdfium from `PDFIUM_LIB_PATH`, the working directory, or the system
/// library path, in that order.
fn bind_pdfium() -> Result<Pdfium, WorkoutError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| WorkoutError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Classify a pdfium load failure: password problems are told apart from a
/// corrupt file by pdfium's error name.
fn load_error(pdf_path: &Path, detail: &str, password_given: bool) -> WorkoutError {
    let path = pdf_path.to_path_buf();
    if detail.contains("Password") || detail.contains("password") {
        if password_given {
            WorkoutError::WrongPassword { path }
        } else {
            WorkoutError::PasswordRequired { path }
        }
    } else {
        WorkoutError::CorruptPdf {
            path,
            detail: detail.to_string(),
        }
    }
}

/// Rasterise every page of `pdf_path` into `dest_dir` as
/// `<stem>_page_<n>.png`, returning the paths in page order.
pub fn rasterise_pdf(
    pdf_path: &Path,
    dest_dir: &Path,
    password: Option<&str>,
    max_pixels: u32,
) -> Result<Vec<PathBuf>, WorkoutError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| load_error(pdf_path, &format!("{:?}", e), password.is_some()))?;

    let stem = pdf_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut results = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx + 1;
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            WorkoutError::RasterisationFailed {
                path: pdf_path.to_path_buf(),
                page: page_num,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        let out = dest_dir.join(format!("{stem}_page_{page_num}.png"));
        image
            .save_with_format(&out, ImageFormat::Png)
            .map_err(|e| WorkoutError::RasterisationFailed {
                path: pdf_path.to_path_buf(),
                page: page_num,
                detail: format!("saving PNG failed: {e}"),
            })?;

        debug!(
            "Rendered page {} → {}x{} px → {}",
            page_num,
            image.width(),
            image.height(),
            out.display()
        );
        results.push(out);
    }

    Ok(results)
}

/// Decode an image and write it back out as `<stem>.png` in `dest_dir`.
///
/// The format is guessed from content, not the extension. Decoder errors are
/// returned as-is.
pub fn reencode_image(src: &Path, dest_dir: &Path) -> Result<PathBuf, WorkoutError> {
    let decode_err = |source: image::ImageError| WorkoutError::ImageDecode {
        path: src.to_path_buf(),
        source,
    };

    let image = ImageReader::open(src)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| decode_err(image::ImageError::IoError(e)))?
        .decode()
        .map_err(decode_err)?;

    let stem = src.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    let out = dest_dir.join(format!("{stem}.png"));
    image
        .save_with_format(&out, ImageFormat::Png)
        .map_err(|e| WorkoutError::Internal(format!("re-encode {}: {e}", src.display())))?;

    debug!(
        "Re-encoded {} → {}x{} px → {}",
        src.display(),
        image.width(),
        image.height(),
        out.display()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn reencode_jpeg_to_png() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("log.jpg");
        RgbImage::from_pixel(8, 6, Rgb([200, 10, 10]))
            .save_with_format(&src, ImageFormat::Jpeg)
            .unwrap();

        let out_dir = dir.path().join("out");
        std::fs::create_dir_all(&out_dir).unwrap();
        let out = reencode_image(&src, &out_dir).unwrap();

        assert_eq!(out, out_dir.join("log.png"));
        let back = image::open(&out).unwrap();
        assert_eq!((back.width(), back.height()), (8, 6));
    }

    #[test]
    fn corrupt_image_surfaces_decoder_error() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("broken.png");
        std::fs::write(&src, b"\x89PNG\r\n\x1a\nnot really").unwrap();

        let err = reencode_image(&src, dir.path()).unwrap_err();
        assert!(matches!(err, WorkoutError::ImageDecode { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn images_keep_upload_order() {
        let dir = TempDir::new().unwrap();
        let mut inputs = Vec::new();
        for name in ["b.png", "a.png", "c.png"] {
            let p = dir.path().join(name);
            RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])).save(&p).unwrap();
            inputs.push(p.to_string_lossy().to_string());
        }

        let config = ExtractionConfig::default();
        let batch = normalize_inputs(&inputs, &config).await.unwrap();

        let names: Vec<_> = batch
            .images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["b.png", "a.png", "c.png"]);
        assert_eq!(batch.input_files, 3);
        assert!(batch.images.iter().all(|p| p.starts_with(batch.work_dir())));
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let config = ExtractionConfig::default();
        let err = normalize_inputs(&[], &config).await.err().unwrap();
        assert!(matches!(err, WorkoutError::NoInputs));
    }

    /// pdfium is a native library; skip when it is not installed.
    macro_rules! pdfium_or_skip {
        () => {
            match bind_pdfium() {
                Ok(p) => p,
                Err(e) => {
                    println!("SKIP: pdfium not available ({e}); set PDFIUM_LIB_PATH");
                    return;
                }
            }
        };
    }

    fn blank_pdf(pdfium: &Pdfium, path: &Path, pages: usize) {
        let mut document = pdfium.create_new_pdf().unwrap();
        for _ in 0..pages {
            document
                .pages_mut()
                .create_page_at_end(PdfPagePaperSize::a4())
                .unwrap();
        }
        document.save_to_file(path).unwrap();
    }

    #[test]
    fn every_pdf_page_is_rendered_in_order() {
        let pdfium = pdfium_or_skip!();
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("week1.pdf");
        blank_pdf(&pdfium, &pdf, 3);
        drop(pdfium);

        let out_dir = dir.path().join("pages");
        std::fs::create_dir_all(&out_dir).unwrap();
        let pages = rasterise_pdf(&pdf, &out_dir, None, 200).unwrap();

        let names: Vec<_> = pages
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["week1_page_1.png", "week1_page_2.png", "week1_page_3.png"]);
        for page in &pages {
            let img = image::open(page).unwrap();
            assert!(img.width() <= 200 && img.height() <= 200);
        }
    }

    #[tokio::test]
    async fn pdf_pages_follow_their_input_position() {
        let pdfium = pdfium_or_skip!();
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("scan.pdf");
        blank_pdf(&pdfium, &pdf, 2);
        drop(pdfium);
        let photo = dir.path().join("after.png");
        RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])).save(&photo).unwrap();

        let inputs = [
            pdf.to_string_lossy().to_string(),
            photo.to_string_lossy().to_string(),
        ];
        let config = ExtractionConfig::builder()
            .max_rendered_pixels(200)
            .build()
            .unwrap();
        let batch = normalize_inputs(&inputs, &config).await.unwrap();

        let names: Vec<_> = batch
            .images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["scan_page_1.png", "scan_page_2.png", "after.png"]);
        assert_eq!(batch.input_files, 2);
    }

    #[test]
    fn truncated_pdf_is_corrupt() {
        let _pdfium = pdfium_or_skip!();
        let dir = TempDir::new().unwrap();
        let pdf = dir.path().join("torn.pdf");
        std::fs::write(&pdf, b"%PDF-1.7\n1 0 obj\n<<").unwrap();

        let err = rasterise_pdf(&pdf, dir.path(), None, 200).unwrap_err();
        assert!(matches!(err, WorkoutError::CorruptPdf { .. }), "got {err:?}");
    }

    #[test]
    fn password_errors_are_told_apart() {
        let path = Path::new("locked.pdf");
        let detail = format!(
            "{:?}",
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError)
        );

        assert!(matches!(
            load_error(path, &detail, false),
            WorkoutError::PasswordRequired { .. }
        ));
        assert!(matches!(
            load_error(path, &detail, true),
            WorkoutError::WrongPassword { .. }
        ));
        assert!(matches!(
            load_error(path, "FormatError", false),
            WorkoutError::CorruptPdf { ref detail, .. } if detail == "FormatError"
        ));
    }
}
