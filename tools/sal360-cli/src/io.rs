//! Image file adapter between the `image` crate and [`ImageBuffer`].
//!
//! Decoded samples are scaled to `[0, 1]`. Any decode or encode failure is
//! reported as [`Sal360Error::MediaOpen`].

use std::path::Path;

use sal360_common::{Sal360Error, Sal360Result};
use sal360_sphere_model::ImageBuffer;

fn media_error(path: &Path, err: impl std::fmt::Display) -> Sal360Error {
    tracing::error!(path = %path.display(), error = %err, "media I/O failed");
    Sal360Error::MediaOpen {
        path: path.to_path_buf(),
    }
}

fn require_exists(path: &Path) -> Sal360Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Sal360Error::FileNotFound {
            path: path.to_path_buf(),
        })
    }
}

fn ensure_parent(path: &Path) -> Sal360Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Load an image as a 3-channel RGB buffer.
pub fn load_rgb(path: &Path) -> Sal360Result<ImageBuffer> {
    require_exists(path)?;
    let rgb = image::open(path)
        .map_err(|e| media_error(path, e))?
        .into_rgb8();
    let (width, height) = rgb.dimensions();
    let data = rgb.into_raw().into_iter().map(|v| v as f32 / 255.0).collect();
    Ok(ImageBuffer::from_raw(
        width as usize,
        height as usize,
        3,
        data,
    )?)
}

/// Load an image as a single-channel field.
pub fn load_gray(path: &Path) -> Sal360Result<ImageBuffer> {
    require_exists(path)?;
    let luma = image::open(path)
        .map_err(|e| media_error(path, e))?
        .into_luma8();
    let (width, height) = luma.dimensions();
    let data = luma.into_raw().into_iter().map(|v| v as f32 / 255.0).collect();
    Ok(ImageBuffer::from_raw(
        width as usize,
        height as usize,
        1,
        data,
    )?)
}

fn to_bytes(buffer: &ImageBuffer) -> Vec<u8> {
    let mut scaled = buffer.clone();
    if let Some((min, max)) = scaled.min_max() {
        if min < 0.0 || max > 1.0 {
            scaled.normalize_min_max();
        }
    }
    scaled
        .data()
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect()
}

/// Save the first channel of `field` as an 8-bit grayscale image.
///
/// Values outside `[0, 1]` are min-max rescaled first.
pub fn save_gray(field: &ImageBuffer, path: &Path) -> Sal360Result<()> {
    let single = if field.channels() == 1 {
        field.clone()
    } else {
        field.channel(0)?
    };
    ensure_parent(path)?;
    let image = image::GrayImage::from_raw(
        single.width() as u32,
        single.height() as u32,
        to_bytes(&single),
    )
    .ok_or_else(|| media_error(path, "buffer does not match image size"))?;
    image.save(path).map_err(|e| media_error(path, e))
}

/// Save a 3-channel buffer as RGB, or a single-channel one as grayscale.
pub fn save_image(buffer: &ImageBuffer, path: &Path) -> Sal360Result<()> {
    if buffer.channels() != 3 {
        return save_gray(buffer, path);
    }
    ensure_parent(path)?;
    let image = image::RgbImage::from_raw(
        buffer.width() as u32,
        buffer.height() as u32,
        to_bytes(buffer),
    )
    .ok_or_else(|| media_error(path, "buffer does not match image size"))?;
    image.save(path).map_err(|e| media_error(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_gray_save_and_load() {
        let dir = temp_dir("sal360_test_io_gray");
        let path = dir.join("field.png");
        let field = ImageBuffer::from_fn(8, 4, 1, |x, _, _| x as f32 / 7.0).unwrap();

        save_gray(&field, &path).unwrap();
        let loaded = load_gray(&path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (8, 4));
        assert!((loaded.get(0, 0, 0) - 0.0).abs() < 1e-6);
        assert!((loaded.get(7, 3, 0) - 1.0).abs() < 1e-6);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_out_of_range_field_is_rescaled() {
        let field = ImageBuffer::from_raw(2, 1, 1, vec![-3.0, 5.0]).unwrap();
        assert_eq!(to_bytes(&field), vec![0, 255]);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let path = std::env::temp_dir().join("sal360_test_io_absent.png");
        let _ = std::fs::remove_file(&path);
        assert!(matches!(
            load_rgb(&path),
            Err(Sal360Error::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_undecodable_file_is_media_open() {
        let dir = temp_dir("sal360_test_io_garbage");
        let path = dir.join("garbage.png");
        std::fs::write(&path, b"not an image").unwrap();
        let err = load_rgb(&path).unwrap_err();
        assert!(err.is_media_open());
        std::fs::remove_dir_all(&dir).ok();
    }
}
