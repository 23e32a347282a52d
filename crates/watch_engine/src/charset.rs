use chardetng::EncodingDetector;
use encoding_rs::Encoding;

use crate::FetchOutput;

/// A product page decoded to UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub html: String,
    pub encoding_label: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("page from {url} is not valid {encoding}")]
pub struct PageDecodeError {
    pub url: String,
    pub encoding: String,
}

/// Decodes a fetched page: BOM first, then the Content-Type charset, then
/// `chardetng` detection over the whole body.
pub fn decode_page(output: &FetchOutput) -> Result<PageText, PageDecodeError> {
    let bytes = output.bytes.as_slice();
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| {
            output
                .metadata
                .content_type
                .as_deref()
                .and_then(charset_label)
                .and_then(|label| Encoding::for_label(label.as_bytes()))
        })
        .unwrap_or_else(|| {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            detector.guess(None, true)
        });

    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(PageDecodeError {
            url: output.metadata.final_url.clone(),
            encoding: encoding.name().to_string(),
        });
    }
    Ok(PageText {
        html: text.into_owned(),
        encoding_label: encoding.name().to_string(),
    })
}

fn charset_label(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(&['"', '\''][..]).to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FetchMetadata;

    fn output(bytes: &[u8], content_type: Option<&str>) -> FetchOutput {
        FetchOutput {
            bytes: bytes.to_vec(),
            metadata: FetchMetadata {
                final_url: "https://shop.example/p".into(),
                content_type: content_type.map(str::to_string),
            },
        }
    }

    #[test]
    fn header_charset_is_honoured() {
        // "£5" in windows-1252
        let page = decode_page(&output(b"\xa35", Some("text/html; Charset=\"windows-1252\""))).unwrap();
        assert_eq!(page.html, "£5");
        assert_eq!(page.encoding_label, "windows-1252");
    }

    #[test]
    fn bom_wins_over_header() {
        let page = decode_page(&output(b"\xef\xbb\xbf\xc2\xa35", Some("text/html; charset=iso-8859-1"))).unwrap();
        assert_eq!(page.html, "£5");
        assert_eq!(page.encoding_label, "UTF-8");
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let err = decode_page(&output(b"abc\xff", Some("text/html; charset=utf-8"))).unwrap_err();
        assert_eq!(err.encoding, "UTF-8");
    }
}
