//! Recovers a price from the image a shop renders it as.
//!
//! The image is normalised for OCR first: opaque images are binarised with
//! an Otsu threshold and flipped to dark-on-light, transparent images keep
//! only their alpha channel. Both get a 10 px border, because recognition
//! degrades when glyphs touch the edge.

use std::collections::HashMap;
use std::str::FromStr;

use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgba, RgbaImage};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use watch_logging::watch_debug;

/// Border added on every side before recognition.
pub const PADDING: u32 = 10;

/// Characters a price image may contain.
pub const PRICE_ALPHABET: &str = "£.0123456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeMode {
    /// Solid background; binarise and normalise polarity.
    Opaque,
    /// Glyphs drawn on transparency; alpha is the only signal.
    Transparent,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PriceDecodeError {
    #[error("image could not be decoded: {0}")]
    Image(String),
    #[error("recognition failed: {0}")]
    Recognition(String),
    #[error("recognized text {0:?} is not a price")]
    Unparseable(String),
}

/// Single-line character recognition over a prepared image.
pub trait Recognizer: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<String, PriceDecodeError>;
}

/// Turns encoded image bytes into a price.
pub trait PriceReader: Send + Sync {
    fn read_price(&self, image_bytes: &[u8], mode: DecodeMode) -> Result<Decimal, PriceDecodeError>;
}

pub struct PriceImageDecoder<R> {
    recognizer: R,
}

impl<R: Recognizer> PriceImageDecoder<R> {
    pub fn new(recognizer: R) -> Self {
        Self { recognizer }
    }

    pub fn decode(&self, image_bytes: &[u8], mode: DecodeMode) -> Result<Decimal, PriceDecodeError> {
        let image = image::load_from_memory(image_bytes)
            .map_err(|err| PriceDecodeError::Image(err.to_string()))?;
        let prepared = prepare(&image, mode);
        let text = self.recognizer.recognize(&prepared)?;
        watch_debug!("Recognized {:?} ({:?} mode)", text.trim(), mode);
        parse_price_text(&text)
    }
}

impl<R: Recognizer> PriceReader for PriceImageDecoder<R> {
    fn read_price(&self, image_bytes: &[u8], mode: DecodeMode) -> Result<Decimal, PriceDecodeError> {
        self.decode(image_bytes, mode)
    }
}

/// Applies the mode's normalisation and the padding.
pub fn prepare(image: &DynamicImage, mode: DecodeMode) -> DynamicImage {
    match mode {
        DecodeMode::Opaque => {
            let binary = binarize(&image.to_luma8());
            DynamicImage::ImageLuma8(pad_gray(&binary, 255))
        }
        DecodeMode::Transparent => {
            let solid = alpha_only(&image.to_rgba8());
            DynamicImage::ImageRgba8(pad_rgba(&solid, Rgba([0, 0, 0, 0])))
        }
    }
}

/// Otsu threshold of a grayscale image: the level maximising between-class
/// variance. Pixels `<= level` are ink.
pub fn otsu_level(image: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[usize::from(pixel[0])] += 1;
    }

    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0;
    }
    let weighted_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(level, count)| level as f64 * *count as f64)
        .sum();

    let mut best_level = 0u8;
    let mut best_variance = -1.0f64;
    let mut background_count = 0u64;
    let mut background_sum = 0.0f64;

    for (level, count) in histogram.iter().enumerate() {
        background_count += count;
        if background_count == 0 {
            continue;
        }
        let foreground_count = total - background_count;
        if foreground_count == 0 {
            break;
        }
        background_sum += level as f64 * *count as f64;

        let background_mean = background_sum / background_count as f64;
        let foreground_mean = (weighted_total - background_sum) / foreground_count as f64;
        let variance = background_count as f64
            * foreground_count as f64
            * (background_mean - foreground_mean).powi(2);

        if variance > best_variance {
            best_variance = variance;
            best_level = level as u8;
        }
    }
    best_level
}

/// Thresholds at the Otsu level, then inverts when dark pixels dominate so
/// text always ends up dark on a light background.
pub fn binarize(image: &GrayImage) -> GrayImage {
    let level = otsu_level(image);
    let mut binary = GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y)[0] > level {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    let dark = binary.pixels().filter(|pixel| pixel[0] == 0).count();
    let light = binary.pixels().len() - dark;
    if dark > light {
        for pixel in binary.pixels_mut() {
            pixel[0] = 255 - pixel[0];
        }
    }
    binary
}

fn alpha_only(image: &RgbaImage) -> RgbaImage {
    let mut solid = image.clone();
    for pixel in solid.pixels_mut() {
        let alpha = pixel[3];
        *pixel = Rgba([0, 0, 0, alpha]);
    }
    solid
}

fn pad_gray(image: &GrayImage, background: u8) -> GrayImage {
    let mut padded = GrayImage::from_pixel(
        image.width() + 2 * PADDING,
        image.height() + 2 * PADDING,
        Luma([background]),
    );
    image::imageops::replace(&mut padded, image, i64::from(PADDING), i64::from(PADDING));
    padded
}

fn pad_rgba(image: &RgbaImage, background: Rgba<u8>) -> RgbaImage {
    let mut padded = RgbaImage::from_pixel(
        image.width() + 2 * PADDING,
        image.height() + 2 * PADDING,
        background,
    );
    image::imageops::replace(&mut padded, image, i64::from(PADDING), i64::from(PADDING));
    padded
}

/// Strips whitespace and the currency symbol, then parses what is left.
pub fn parse_price_text(text: &str) -> Result<Decimal, PriceDecodeError> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != '£' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(PriceDecodeError::Unparseable(text.trim().to_string()));
    }
    Decimal::from_str(&cleaned).map_err(|_| PriceDecodeError::Unparseable(text.trim().to_string()))
}

/// Recognizer backed by the `tesseract` binary.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    language: String,
}

impl TesseractRecognizer {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    fn args(&self) -> rusty_tesseract::Args {
        rusty_tesseract::Args {
            lang: self.language.clone(),
            config_variables: HashMap::from([(
                "tessedit_char_whitelist".to_string(),
                PRICE_ALPHABET.to_string(),
            )]),
            dpi: Some(150),
            // Single text line.
            psm: Some(7),
            oem: Some(3),
        }
    }
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::new("eng")
    }
}

impl Recognizer for TesseractRecognizer {
    fn recognize(&self, image: &DynamicImage) -> Result<String, PriceDecodeError> {
        let file = tempfile::Builder::new()
            .prefix("price-")
            .suffix(".png")
            .tempfile()
            .map_err(|err| PriceDecodeError::Recognition(err.to_string()))?;
        image
            .save_with_format(file.path(), ImageFormat::Png)
            .map_err(|err| PriceDecodeError::Recognition(err.to_string()))?;

        let input = rusty_tesseract::Image::from_path(file.path())
            .map_err(|err| PriceDecodeError::Recognition(err.to_string()))?;
        rusty_tesseract::image_to_string(&input, &self.args())
            .map_err(|err| PriceDecodeError::Recognition(err.to_string()))
    }
}
