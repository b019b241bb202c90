use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

use crate::handle::AccessUrl;
use crate::media::MediaType;

/// How a stored value points at an image.
///
/// Older documents embed images inline as `data:` URLs; newer ones hold a
/// blob key; either may instead carry a remote URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageRef {
    Inline { media_type: MediaType, payload: Vec<u8> },
    Referenced(String),
    External(String),
}

/// Something a caller can display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedImage {
    Handle(AccessUrl),
    External(String),
}

impl ResolvedImage {
    pub fn as_str(&self) -> &str {
        match self {
            ResolvedImage::Handle(url) => url.as_str(),
            ResolvedImage::External(url) => url,
        }
    }
}

impl ImageRef {
    /// Parse a stored string. Empty strings and malformed `data:` URLs are
    /// "no image".
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if let Some(rest) = value.strip_prefix("data:") {
            return Self::parse_data_url(rest);
        }
        let lower = value.get(..8).map(str::to_ascii_lowercase).unwrap_or_default();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Some(ImageRef::External(value.to_string()));
        }
        Some(ImageRef::Referenced(value.to_string()))
    }

    /// Parse a JSON field. Only strings can hold an image.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_str().and_then(Self::parse)
    }

    fn parse_data_url(rest: &str) -> Option<Self> {
        let Some((header, data)) = rest.split_once(',') else {
            tracing::debug!("data URL without payload separator");
            return None;
        };
        let mut params = header.split(';');
        let mime = params.next().unwrap_or_default();
        let is_base64 = params.any(|p| p.eq_ignore_ascii_case("base64"));
        let payload = if is_base64 {
            match STANDARD.decode(data.trim()) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::debug!(error = %err, "malformed inline image payload");
                    return None;
                },
            }
        } else {
            data.as_bytes().to_vec()
        };
        let media_type = match MediaType::from_mime(mime) {
            MediaType::Unknown => MediaType::from_magic_bytes(&payload),
            known => known,
        };
        Some(ImageRef::Inline { media_type, payload })
    }

    /// The blob key, for references that point into the blob store.
    pub fn key(&self) -> Option<&str> {
        match self {
            ImageRef::Referenced(key) => Some(key),
            _ => None,
        }
    }

    /// Encode back into the string form accepted by [`ImageRef::parse`].
    pub fn to_value(&self) -> Value {
        match self {
            ImageRef::Inline { media_type, payload } => {
                Value::String(format!("data:{};base64,{}", media_type.mime(), STANDARD.encode(payload)))
            },
            ImageRef::Referenced(key) => Value::String(key.clone()),
            ImageRef::External(url) => Value::String(url.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!("user-avatar"), Some(ImageRef::Referenced("user-avatar".to_string())))]
    #[case(json!("https://x/a.png"), Some(ImageRef::External("https://x/a.png".to_string())))]
    #[case(json!("HTTP://x/a.png"), Some(ImageRef::External("HTTP://x/a.png".to_string())))]
    #[case(json!(""), None)]
    #[case(json!("   "), None)]
    #[case(json!(null), None)]
    #[case(json!(42), None)]
    #[case(json!({"src": "x"}), None)]
    fn test_from_value(#[case] value: Value, #[case] expected: Option<ImageRef>) {
        assert_eq!(ImageRef::from_value(&value), expected);
    }

    #[test]
    fn test_inline_base64() {
        let parsed = ImageRef::parse("data:image/png;base64,iVBORw0KGgo=").unwrap();
        let ImageRef::Inline { media_type, payload } = &parsed else {
            panic!("expected inline image, got {parsed:?}");
        };
        assert_eq!(*media_type, MediaType::Png);
        assert_eq!(payload, &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
        assert_eq!(ImageRef::from_value(&parsed.to_value()), Some(parsed));
    }

    #[test]
    fn test_inline_unknown_mime_is_sniffed() {
        let parsed = ImageRef::parse("data:application/octet-stream;base64,R0lGODlh").unwrap();
        assert!(matches!(parsed, ImageRef::Inline { media_type: MediaType::Gif, .. }));
    }

    #[test]
    fn test_inline_plain_text_svg() {
        let parsed = ImageRef::parse("data:image/svg+xml,<svg/>").unwrap();
        assert_eq!(
            parsed,
            ImageRef::Inline {
                media_type: MediaType::Svg,
                payload: b"<svg/>".to_vec()
            }
        );
    }

    #[rstest]
    #[case("data:image/png;base64,!!!not-base64!!!")]
    #[case("data:image/png;base64")]
    fn test_malformed_inline_is_no_image(#[case] value: &str) {
        assert_eq!(ImageRef::parse(value), None);
    }
}
