use super::error::RenderError;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Writes `source` resized to `width` (aspect preserved) as a JPEG at `dest`.
    async fn render(&self, source: &str, dest: &str, width: u32) -> Result<(), RenderError>;
}

#[derive(Debug, Clone)]
pub struct ImageRenderer {
    jpeg_quality: u8,
}

impl ImageRenderer {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality }
    }
}

impl Default for ImageRenderer {
    fn default() -> Self {
        Self::new(95)
    }
}

/// Height for `width` keeping the source aspect ratio, never below 1px.
pub fn proportional_height(src_width: u32, src_height: u32, width: u32) -> u32 {
    if src_width == 0 {
        return 1;
    }
    let height = (src_height as f64 * width as f64 / src_width as f64).round() as u32;
    height.max(1)
}

fn resize_to_width(img: &DynamicImage, width: u32) -> DynamicImage {
    let (src_width, src_height) = img.dimensions();
    let height = proportional_height(src_width, src_height, width);
    img.resize_exact(width, height, FilterType::Lanczos3)
}

/// uid/gid/user of the running process, for permission diagnostics.
pub fn process_identity() -> String {
    let uid = nix::unistd::getuid();
    let gid = nix::unistd::getgid();
    match nix::unistd::User::from_uid(uid) {
        Ok(Some(user)) => format!(
            "uid={} gid={} user={} home={}",
            uid,
            gid,
            user.name,
            user.dir.display()
        ),
        _ => format!("uid={uid} gid={gid}"),
    }
}

fn render_blocking(
    source: &Path,
    dest: &Path,
    width: u32,
    quality: u8,
) -> Result<(u32, u32), RenderError> {
    let img = image::open(source).map_err(|e| RenderError::SourceUnreadable {
        path: source.display().to_string(),
        reason: e.to_string(),
    })?;

    let resized = resize_to_width(&img, width).to_rgb8();

    let unwritable = |reason: String| RenderError::DestUnwritable {
        path: dest.display().to_string(),
        reason,
        identity: process_identity(),
    };

    let file = File::create(dest).map_err(|e| unwritable(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    resized
        .write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality))
        .map_err(|e| unwritable(e.to_string()))?;
    // a failure on the last buffered bytes only shows up here
    writer.flush().map_err(|e| unwritable(e.to_string()))?;
    writer
        .into_inner()
        .map_err(|e| unwritable(e.error().to_string()))?
        .sync_all()
        .map_err(|e| unwritable(e.to_string()))?;

    Ok(resized.dimensions())
}

#[async_trait]
impl Renderer for ImageRenderer {
    async fn render(&self, source: &str, dest: &str, width: u32) -> Result<(), RenderError> {
        if width == 0 {
            return Err(RenderError::InvalidWidth(dest.to_string()));
        }

        let source_path = PathBuf::from(source);
        let dest_path = PathBuf::from(dest);
        let quality = self.jpeg_quality;

        let (out_width, out_height) = tokio::task::spawn_blocking(move || {
            render_blocking(&source_path, &dest_path, width, quality)
        })
        .await
        .map_err(|e| RenderError::Aborted(e.to_string()))??;

        debug!(dest, out_width, out_height, "Rendition written");
        Ok(())
    }
}
