// src/services/image_processor.rs
use crate::errors::BotError;
use image::{
    DynamicImage, GenericImageView, ImageFormat as ImgFormat, ImageOutputFormat, Rgb, RgbImage,
};
use std::io::Cursor;

/// Telegram accepts photos up to 10 MB; generated images are kept well below.
const CHAT_PHOTO_BUDGET_MB: usize = 5;
const CHAT_MAX_SIDE: u32 = 2000;
const UPLOAD_MAX_SIDE: u32 = 2048;

pub struct ImageProcessor {
    max_upload_bytes: usize,
}

impl ImageProcessor {
    pub fn new(max_image_size_mb: usize) -> Self {
        Self {
            max_upload_bytes: max_image_size_mb * 1024 * 1024,
        }
    }

    fn load(data: &[u8]) -> Result<DynamicImage, BotError> {
        image::load_from_memory(data)
            .map_err(|e| BotError::ImageProcessing(format!("Failed to load image: {}", e)))
    }

    fn encode(img: &DynamicImage, format: ImageOutputFormat) -> Result<Vec<u8>, BotError> {
        let mut output = Vec::new();
        img.write_to(&mut Cursor::new(&mut output), format)
            .map_err(|e| BotError::ImageProcessing(format!("Failed to encode image: {}", e)))?;
        Ok(output)
    }

    /// Composites transparency onto a white background.
    fn flatten(img: &DynamicImage) -> DynamicImage {
        if !img.color().has_alpha() {
            return DynamicImage::ImageRgb8(img.to_rgb8());
        }

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let flat = RgbImage::from_fn(width, height, |x, y| {
            let [r, g, b, a] = rgba.get_pixel(x, y).0;
            let blend = |c: u8| ((c as u32 * a as u32 + 255 * (255 - a as u32)) / 255) as u8;
            Rgb([blend(r), blend(g), blend(b)])
        });
        DynamicImage::ImageRgb8(flat)
    }

    /// Checks that an incoming photo decodes and fits the upload budget.
    pub fn validate_upload(&self, data: &[u8]) -> Result<(u32, u32), BotError> {
        if data.len() > self.max_upload_bytes {
            return Err(BotError::ImageProcessing(format!(
                "Image is {} bytes, limit is {}",
                data.len(),
                self.max_upload_bytes
            )));
        }

        let img = image::load_from_memory(data)
            .map_err(|e| BotError::ImageProcessing(format!("Invalid image format: {}", e)))?;

        Ok(img.dimensions())
    }

    /// Validates an incoming photo and bounds it before it is embedded in a
    /// model request. Formats other than JPEG and PNG are converted to PNG.
    pub fn prepare_upload(&self, data: &[u8]) -> Result<Vec<u8>, BotError> {
        self.validate_upload(data)?;
        let bounded = self.resize_if_needed(data, UPLOAD_MAX_SIDE)?;
        match image::guess_format(&bounded) {
            Ok(ImgFormat::Jpeg | ImgFormat::Png) => Ok(bounded),
            _ => self.convert_to_png(&bounded),
        }
    }

    pub fn resize_if_needed(&self, data: &[u8], max_size: u32) -> Result<Vec<u8>, BotError> {
        let img = Self::load(data)?;

        let (width, height) = img.dimensions();

        if width <= max_size && height <= max_size {
            return Ok(data.to_vec());
        }

        let ratio = (max_size as f32 / width.max(height) as f32).min(1.0);
        let new_width = ((width as f32 * ratio) as u32).max(1);
        let new_height = ((height as f32 * ratio) as u32).max(1);

        let resized = img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3);

        if resized.color().has_alpha() {
            Self::encode(&resized, ImageOutputFormat::Png)
        } else {
            Self::encode(&DynamicImage::ImageRgb8(resized.to_rgb8()), ImageOutputFormat::Jpeg(90))
        }
    }

    /// JPEG re-encode, stepping quality down by 10 while the result is over
    /// budget and quality stays above 20.
    pub fn compress_image(
        &self,
        data: &[u8],
        max_size_mb: usize,
        quality: u8,
    ) -> Result<Vec<u8>, BotError> {
        let img = Self::flatten(&Self::load(data)?);
        let budget = max_size_mb * 1024 * 1024;

        let mut quality = quality;
        let mut output = Self::encode(&img, ImageOutputFormat::Jpeg(quality))?;
        while output.len() > budget && quality > 20 {
            quality -= 10;
            output = Self::encode(&img, ImageOutputFormat::Jpeg(quality))?;
        }

        Ok(output)
    }

    /// Longest side at most `max_dimension`; PNG for images with alpha.
    pub fn resize_for_telegram(&self, data: &[u8], max_dimension: u32) -> Result<Vec<u8>, BotError> {
        self.resize_if_needed(data, max_dimension)
    }

    /// Exact marketplace card size (WB/Ozon use 3:4).
    pub fn resize_for_marketplace(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, BotError> {
        let img = Self::flatten(&Self::load(data)?);
        let resized = img.resize_exact(width, height, image::imageops::FilterType::Lanczos3);
        Self::encode(&resized, ImageOutputFormat::Jpeg(95))
    }

    /// Resize and compress a generated image for sending as a chat photo.
    pub fn prepare_for_chat(&self, data: &[u8]) -> Result<Vec<u8>, BotError> {
        let resized = self.resize_for_telegram(data, CHAT_MAX_SIDE)?;
        self.compress_image(&resized, CHAT_PHOTO_BUDGET_MB, 85)
    }

    pub fn dimensions(&self, data: &[u8]) -> Result<(u32, u32), BotError> {
        Ok(Self::load(data)?.dimensions())
    }

    pub fn convert_to_png(&self, data: &[u8]) -> Result<Vec<u8>, BotError> {
        let img = DynamicImage::ImageRgba8(Self::load(data)?.to_rgba8());
        Self::encode(&img, ImageOutputFormat::Png)
    }

    /// MIME type for a data URL, guessed from the magic bytes.
    pub fn mime_type(data: &[u8]) -> &'static str {
        match image::guess_format(data) {
            Ok(ImgFormat::Png) => "image/png",
            Ok(ImgFormat::WebP) => "image/webp",
            Ok(ImgFormat::Gif) => "image/gif",
            _ => "image/jpeg",
        }
    }
}

#[cfg(test)]
pub mod samples {
    use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    pub fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 255]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
            .unwrap();
        out
    }

    pub fn transparent_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
            .unwrap();
        out
    }

    pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 120, 200]));
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Jpeg(90))
            .unwrap();
        out
    }
}
