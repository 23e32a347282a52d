use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

/// CSS selectors locating the fields of a product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSelectors {
    pub name: String,
    pub standard_price_image: String,
    pub member_price_image: String,
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            name: "span.item_brand_name".to_string(),
            standard_price_image: "div.itemcard_order_button_cust_price_wrapper.base_price img"
                .to_string(),
            member_price_image: "div.itemcard_order_button_gold_price_wrapper img".to_string(),
        }
    }
}

/// Raw fields pulled out of a product page, before any OCR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFields {
    pub name: Option<String>,
    pub standard_price_image: Vec<u8>,
    pub member_price_image: Vec<u8>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("invalid selector for {field}: {message}")]
    Selector { field: &'static str, message: String },
    #[error("{field} not found in page")]
    NotFound { field: &'static str },
    #[error("{field} image source is not an inline base64 image")]
    UnsupportedImageSource { field: &'static str },
    #[error("{field} image is not valid base64: {message}")]
    InvalidBase64 { field: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct FieldExtractor {
    name: Selector,
    standard_price_image: Selector,
    member_price_image: Selector,
}

impl FieldExtractor {
    pub fn new(selectors: &PageSelectors) -> Result<Self, ExtractError> {
        Ok(Self {
            name: parse_selector("name", &selectors.name)?,
            standard_price_image: parse_selector(
                "standard price image",
                &selectors.standard_price_image,
            )?,
            member_price_image: parse_selector("member price image", &selectors.member_price_image)?,
        })
    }

    pub fn extract(&self, html: &str) -> Result<PageFields, ExtractError> {
        let doc = Html::parse_document(html);

        let name = doc
            .select(&self.name)
            .next()
            .map(|node| node.text().collect::<String>().trim().to_string())
            .filter(|name| !name.is_empty());

        Ok(PageFields {
            name,
            standard_price_image: image_bytes(&doc, &self.standard_price_image, "standard price image")?,
            member_price_image: image_bytes(&doc, &self.member_price_image, "member price image")?,
        })
    }
}

fn parse_selector(field: &'static str, css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|err| ExtractError::Selector {
        field,
        message: err.to_string(),
    })
}

fn image_bytes(doc: &Html, selector: &Selector, field: &'static str) -> Result<Vec<u8>, ExtractError> {
    let src = doc
        .select(selector)
        .next()
        .and_then(|node| node.value().attr("src"))
        .ok_or(ExtractError::NotFound { field })?;
    decode_data_url(src, field)
}

/// Decodes `data:image/<type>;base64,<payload>`.
fn decode_data_url(src: &str, field: &'static str) -> Result<Vec<u8>, ExtractError> {
    let unsupported = || ExtractError::UnsupportedImageSource { field };
    let rest = src.trim().strip_prefix("data:").ok_or_else(unsupported)?;
    let (header, payload) = rest.split_once(',').ok_or_else(unsupported)?;
    if !header.starts_with("image/") || !header.ends_with(";base64") {
        return Err(unsupported());
    }
    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(payload.as_bytes())
        .map_err(|err| ExtractError::InvalidBase64 {
            field,
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_payload_is_decoded() {
        let bytes = decode_data_url("data:image/png;base64,aGVsbG8=", "f").unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn remote_image_sources_are_rejected() {
        let err = decode_data_url("https://cdn.example/price.png", "f").unwrap_err();
        assert_eq!(err, ExtractError::UnsupportedImageSource { field: "f" });
    }

    #[test]
    fn non_base64_data_url_is_rejected() {
        let err = decode_data_url("data:image/svg+xml;utf8,<svg/>", "f").unwrap_err();
        assert_eq!(err, ExtractError::UnsupportedImageSource { field: "f" });
    }
}
