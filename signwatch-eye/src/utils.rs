//! Utility functions for vision processing

use crate::error::VisionError;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

/// Fill value of the letterbox padding
const PAD_VALUE: u8 = 114;

/// Placement of the original image inside the square model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// Compute the aspect-preserving fit of `width` x `height` into `size` x `size`
    pub fn fit(width: u32, height: u32, size: u32) -> Result<Self, VisionError> {
        if width == 0 || height == 0 {
            return Err(VisionError::Processing("Invalid image dimensions".to_string()));
        }
        if size == 0 {
            return Err(VisionError::Processing("Target dimensions cannot be zero".to_string()));
        }

        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let (new_w, new_h) = scaled_dims(width, height, scale, size);

        Ok(Self {
            scale,
            pad_x: (size - new_w) / 2,
            pad_y: (size - new_h) / 2,
        })
    }

    /// Map a point from model input space back onto the original image
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

fn scaled_dims(width: u32, height: u32, scale: f32, size: u32) -> (u32, u32) {
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
    (new_w, new_h)
}

/// Resize into a padded square canvas and return it with its placement
pub fn letterbox(image: &RgbImage, size: u32) -> Result<(RgbImage, Letterbox), VisionError> {
    let (width, height) = image.dimensions();
    let placement = Letterbox::fit(width, height, size)?;
    let (new_w, new_h) = scaled_dims(width, height, placement.scale, size);

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    imageops::replace(
        &mut canvas,
        &resized,
        placement.pad_x as i64,
        placement.pad_y as i64,
    );

    Ok((canvas, placement))
}

/// Extract pixel data and reshape to CHW format [C, H, W], normalized to [0, 1]
pub fn rgb_to_chw_tensor(image: &RgbImage) -> Result<Vec<f32>, VisionError> {
    let (width, height) = image.dimensions();

    let plane = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| VisionError::Processing("Image dimensions would overflow".to_string()))?;

    if plane == 0 {
        return Err(VisionError::Processing("Invalid image dimensions".to_string()));
    }
    if plane > 100_000_000 {
        return Err(VisionError::Processing("Image too large (max 100M pixels)".to_string()));
    }

    let raw = image.as_raw();
    let mut chw = vec![0.0f32; plane * 3];
    for idx in 0..plane {
        chw[idx] = raw[idx * 3] as f32 / 255.0;
        chw[plane + idx] = raw[idx * 3 + 1] as f32 / 255.0;
        chw[2 * plane + idx] = raw[idx * 3 + 2] as f32 / 255.0;
    }

    Ok(chw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_landscape() {
        let lb = Letterbox::fit(1280, 640, 640).unwrap();
        assert!((lb.scale - 0.5).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 160);
    }

    #[test]
    fn test_fit_rejects_empty() {
        assert!(Letterbox::fit(0, 10, 640).is_err());
        assert!(Letterbox::fit(10, 10, 0).is_err());
    }

    #[test]
    fn test_unmap_inverts_placement() {
        let lb = Letterbox::fit(1280, 640, 640).unwrap();
        let (x, y) = lb.unmap(320.0, 320.0);
        assert!((x - 640.0).abs() < 1e-3);
        assert!((y - 320.0).abs() < 1e-3);
    }

    #[test]
    fn test_letterbox_pads_with_gray() {
        let image = RgbImage::from_pixel(64, 32, Rgb([255, 0, 0]));
        let (canvas, lb) = letterbox(&image, 64).unwrap();
        assert_eq!(canvas.dimensions(), (64, 64));
        assert_eq!(lb.pad_y, 16);
        assert_eq!(canvas.get_pixel(0, 0), &Rgb([114, 114, 114]));
        assert_eq!(canvas.get_pixel(32, 32), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_chw_layout() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        image.put_pixel(1, 0, Rgb([0, 0, 255]));
        let chw = rgb_to_chw_tensor(&image).unwrap();
        assert_eq!(chw, vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_chw_rejects_empty() {
        let image = RgbImage::new(0, 0);
        assert!(rgb_to_chw_tensor(&image).is_err());
    }
}
