use image::imageops::FilterType;

use crate::error::LockerResult;
use crate::state::data::RowImage;

/// Bounding box of images shown in a grid row (rows are 100px tall)
pub const ROW_IMAGE_SIZE: u32 = 100;

/// Bounding box of images in the entry view panel
pub const DETAIL_IMAGE_SIZE: u32 = 480;

/// Decode image bytes and scale them to fit `max_size`, off the async executor
pub async fn decode_scaled(bytes: Vec<u8>, max_size: u32) -> LockerResult<RowImage> {
    // Spawn blocking task for CPU-bound work
    tokio::task::spawn_blocking(move || decode_scaled_blocking(&bytes, max_size)).await?
}

/// Blocking version of the decode
pub fn decode_scaled_blocking(bytes: &[u8], max_size: u32) -> LockerResult<RowImage> {
    let img = image::load_from_memory(bytes)?;

    // Only shrink, never upscale small avatars
    let img = if img.width() > max_size || img.height() > max_size {
        img.resize(max_size, max_size, FilterType::Lanczos3)
    } else {
        img
    };

    Ok(RowImage::from_rgba(img.to_rgba8()))
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = std::io::Cursor::new(Vec::new());
    image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]))
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_large_image_is_scaled_down() {
        let image = decode_scaled_blocking(&png_bytes(400, 200), ROW_IMAGE_SIZE).unwrap();
        assert_eq!((image.width, image.height), (100, 50));
    }

    #[test]
    fn test_small_image_is_kept() {
        let image = decode_scaled_blocking(&png_bytes(32, 32), ROW_IMAGE_SIZE).unwrap();
        assert_eq!((image.width, image.height), (32, 32));
    }

    #[tokio::test]
    async fn test_garbage_is_rejected() {
        assert!(decode_scaled(b"not an image".to_vec(), ROW_IMAGE_SIZE)
            .await
            .is_err());
    }
}
