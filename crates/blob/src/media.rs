use std::fmt::{Display, Formatter, Result as FmtResult};

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const GIF87_MAGIC: &[u8; 6] = b"GIF87a";
const GIF89_MAGIC: &[u8; 6] = b"GIF89a";
const RIFF_MAGIC: &[u8; 4] = b"RIFF";
const WEBP_MAGIC: &[u8; 4] = b"WEBP";
const BMP_MAGIC: &[u8; 2] = b"BM";
const ICO_MAGIC: [u8; 4] = [0x00, 0x00, 0x01, 0x00];
/// SVG is text; only look this far in for the root element.
const SVG_SNIFF_LEN: usize = 512;

/// Image format of a blob payload, sniffed at write time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MediaType {
    Png,
    Jpeg,
    Gif,
    Webp,
    Bmp,
    Svg,
    Ico,
    #[default]
    Unknown,
}

impl From<&[u8]> for MediaType {
    fn from(value: &[u8]) -> Self {
        MediaType::from_magic_bytes(value)
    }
}

impl MediaType {
    /// Detect the format from magic bytes.
    ///
    /// Returns `Unknown` if nothing matches or the input is too short.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Self {
        if bytes.starts_with(&PNG_MAGIC) {
            return MediaType::Png;
        }
        if bytes.starts_with(&JPEG_MAGIC) {
            return MediaType::Jpeg;
        }
        if bytes.starts_with(GIF87_MAGIC) || bytes.starts_with(GIF89_MAGIC) {
            return MediaType::Gif;
        }
        if bytes.len() >= 12 && bytes.starts_with(RIFF_MAGIC) && &bytes[8..12] == WEBP_MAGIC {
            return MediaType::Webp;
        }
        if bytes.starts_with(BMP_MAGIC) {
            return MediaType::Bmp;
        }
        if bytes.starts_with(&ICO_MAGIC) {
            return MediaType::Ico;
        }
        if Self::looks_like_svg(bytes) {
            return MediaType::Svg;
        }
        MediaType::Unknown
    }

    fn looks_like_svg(bytes: &[u8]) -> bool {
        let head = &bytes[..bytes.len().min(SVG_SNIFF_LEN)];
        let Ok(text) = std::str::from_utf8(head) else {
            // The cut may have split a multi-byte character.
            return std::str::from_utf8(&head[..head.len().saturating_sub(3)])
                .is_ok_and(|text| text.trim_start().starts_with('<') && text.contains("<svg"));
        };
        text.trim_start().starts_with('<') && text.contains("<svg")
    }

    /// Parse a MIME type as found in a `data:` URL.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        match mime.trim().to_lowercase().as_str() {
            "image/png" => MediaType::Png,
            "image/jpeg" | "image/jpg" | "image/pjpeg" => MediaType::Jpeg,
            "image/gif" => MediaType::Gif,
            "image/webp" => MediaType::Webp,
            "image/bmp" | "image/x-ms-bmp" => MediaType::Bmp,
            "image/svg+xml" => MediaType::Svg,
            "image/x-icon" | "image/vnd.microsoft.icon" => MediaType::Ico,
            _ => MediaType::Unknown,
        }
    }

    /// Parse a file extension (without the dot). Returns `None` for
    /// extensions this type never writes, so callers can keep them as part
    /// of the name.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(MediaType::Png),
            "jpg" | "jpeg" => Some(MediaType::Jpeg),
            "gif" => Some(MediaType::Gif),
            "webp" => Some(MediaType::Webp),
            "bmp" => Some(MediaType::Bmp),
            "svg" => Some(MediaType::Svg),
            "ico" => Some(MediaType::Ico),
            "bin" => Some(MediaType::Unknown),
            _ => None,
        }
    }

    #[must_use]
    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Gif => "image/gif",
            MediaType::Webp => "image/webp",
            MediaType::Bmp => "image/bmp",
            MediaType::Svg => "image/svg+xml",
            MediaType::Ico => "image/x-icon",
            MediaType::Unknown => "application/octet-stream",
        }
    }

    /// Canonical file extension, without the dot.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            MediaType::Png => "png",
            MediaType::Jpeg => "jpg",
            MediaType::Gif => "gif",
            MediaType::Webp => "webp",
            MediaType::Bmp => "bmp",
            MediaType::Svg => "svg",
            MediaType::Ico => "ico",
            MediaType::Unknown => "bin",
        }
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.mime())
    }
}
