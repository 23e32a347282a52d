use std::io::Cursor;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgba, RgbaImage};
use rust_decimal::Decimal;
use watch_engine::{
    binarize, otsu_level, parse_price_text, prepare, DecodeMode, PriceDecodeError,
    PriceImageDecoder, Recognizer, PADDING,
};

/// Returns a canned answer and remembers the image it was shown.
struct CannedRecognizer {
    answer: Result<String, PriceDecodeError>,
    seen: Arc<Mutex<Option<DynamicImage>>>,
}

impl CannedRecognizer {
    fn new(answer: Result<&str, PriceDecodeError>) -> Self {
        Self {
            answer: answer.map(str::to_string),
            seen: Arc::new(Mutex::new(None)),
        }
    }
}

impl Recognizer for CannedRecognizer {
    fn recognize(&self, image: &DynamicImage) -> Result<String, PriceDecodeError> {
        *self.seen.lock().unwrap() = Some(image.clone());
        self.answer.clone()
    }
}

fn dec(text: &str) -> Decimal {
    Decimal::from_str(text).unwrap()
}

/// Light text (200) on a dark background (30): a 4x2 glyph block in a 12x6 image.
fn light_on_dark() -> GrayImage {
    GrayImage::from_fn(12, 6, |x, y| {
        if (4..8).contains(&x) && (2..4).contains(&y) {
            Luma([200])
        } else {
            Luma([30])
        }
    })
}

fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

#[test]
fn otsu_level_separates_two_intensities() {
    let level = otsu_level(&light_on_dark());
    assert!((30..200).contains(&level), "level {level}");
}

#[test]
fn binarize_inverts_when_ink_dominates() {
    let binary = binarize(&light_on_dark());

    // Background ends up white, the glyph block black.
    assert_eq!(binary.get_pixel(0, 0)[0], 255);
    assert_eq!(binary.get_pixel(5, 3)[0], 0);
}

#[test]
fn binarize_keeps_dark_on_light() {
    let image = GrayImage::from_fn(10, 4, |x, _| if x == 3 { Luma([10]) } else { Luma([240]) });

    let binary = binarize(&image);

    assert_eq!(binary.get_pixel(0, 0)[0], 255);
    assert_eq!(binary.get_pixel(3, 1)[0], 0);
}

#[test]
fn opaque_preparation_pads_with_white() {
    let prepared = prepare(&DynamicImage::ImageLuma8(light_on_dark()), DecodeMode::Opaque);
    let gray = prepared.to_luma8();

    assert_eq!(gray.width(), 12 + 2 * PADDING);
    assert_eq!(gray.height(), 6 + 2 * PADDING);
    assert_eq!(gray.get_pixel(0, 0)[0], 255);
    assert_eq!(gray.get_pixel(PADDING + 5, PADDING + 3)[0], 0);
}

#[test]
fn transparent_preparation_blackens_colour_and_keeps_alpha() {
    let image = RgbaImage::from_fn(3, 2, |x, _| {
        if x == 1 {
            Rgba([250, 200, 10, 255])
        } else {
            Rgba([255, 255, 255, 0])
        }
    });

    let prepared = prepare(&DynamicImage::ImageRgba8(image), DecodeMode::Transparent).to_rgba8();

    assert_eq!(prepared.width(), 3 + 2 * PADDING);
    assert_eq!(*prepared.get_pixel(PADDING + 1, PADDING), Rgba([0, 0, 0, 255]));
    assert_eq!(*prepared.get_pixel(PADDING, PADDING), Rgba([0, 0, 0, 0]));
    assert_eq!(*prepared.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
}

#[test]
fn decode_cleans_recognized_text() {
    let recognizer = CannedRecognizer::new(Ok(" £40.00\n"));
    let decoder = PriceImageDecoder::new(recognizer);
    let bytes = png_bytes(&DynamicImage::ImageLuma8(light_on_dark()));

    let price = decoder.decode(&bytes, DecodeMode::Opaque).unwrap();

    assert_eq!(price, dec("40.00"));
}

#[test]
fn recognizer_sees_the_prepared_image() {
    let recognizer = CannedRecognizer::new(Ok("1.00"));
    let seen = Arc::clone(&recognizer.seen);
    let decoder = PriceImageDecoder::new(recognizer);
    let bytes = png_bytes(&DynamicImage::ImageLuma8(light_on_dark()));

    decoder.decode(&bytes, DecodeMode::Opaque).unwrap();

    let image = seen.lock().unwrap().take().expect("recognizer called");
    assert_eq!(image.width(), 12 + 2 * PADDING);
    assert_eq!(image.height(), 6 + 2 * PADDING);
}

#[test]
fn undecodable_bytes_fail_before_recognition() {
    let recognizer = CannedRecognizer::new(Ok("40.00"));
    let decoder = PriceImageDecoder::new(recognizer);

    let err = decoder.decode(b"not an image", DecodeMode::Opaque).unwrap_err();

    assert!(matches!(err, PriceDecodeError::Image(_)), "{err}");
}

#[test]
fn recognition_errors_propagate() {
    let decoder = PriceImageDecoder::new(CannedRecognizer::new(Err(
        PriceDecodeError::Recognition("tesseract missing".into()),
    )));
    let bytes = png_bytes(&DynamicImage::ImageLuma8(light_on_dark()));

    let err = decoder.decode(&bytes, DecodeMode::Transparent).unwrap_err();

    assert_eq!(err, PriceDecodeError::Recognition("tesseract missing".into()));
}

#[test]
fn unparseable_text_is_rejected() {
    for text in ["", "£", "4.0.0", "..", "12a"] {
        assert!(
            matches!(parse_price_text(text), Err(PriceDecodeError::Unparseable(_))),
            "{text:?}"
        );
    }
}

#[test]
fn formatted_prices_parse_back_to_the_same_value() {
    for text in ["0.99", "5", "12.30", "40.00", "149.99", "1000.5"] {
        let value = dec(text);
        let formatted = format!("£{:.2}", value);
        assert_eq!(parse_price_text(&formatted).unwrap(), value, "{formatted}");
        assert_eq!(parse_price_text(text).unwrap(), value);
    }
}
