/// Image container formats the asset store accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageKind {
    /// Identify the container from its leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [0x89, b'P', b'N', b'G', ..] => Some(Self::Png),
            [b'G', b'I', b'F', b'8', ..] => Some(Self::Gif),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }
}

/// Content type for an asset upload. Unknown payloads are sent as PNG and
/// left for the provider to reject.
pub fn upload_mime(bytes: &[u8]) -> &'static str {
    match ImageKind::sniff(bytes) {
        Some(kind) => kind.mime(),
        None => {
            tracing::warn!(
                "Unrecognized image header {:02X?} ({} bytes), uploading as image/png",
                &bytes[..bytes.len().min(4)],
                bytes.len()
            );
            ImageKind::Png.mime()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_known_formats() {
        assert_eq!(ImageKind::sniff(&[0xFF, 0xD8, 0xFF, 0xDB]), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::sniff(b"\x89PNG\r\n\x1a\n"), Some(ImageKind::Png));
        assert_eq!(ImageKind::sniff(b"GIF87a"), Some(ImageKind::Gif));
        assert_eq!(ImageKind::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageKind::Webp));
    }

    #[test]
    fn test_riff_without_webp_tag_is_unknown() {
        assert_eq!(ImageKind::sniff(b"RIFF\0\0\0\0WAVEfmt "), None);
    }

    #[test]
    fn test_upload_mime_for_gif() {
        assert_eq!(upload_mime(b"GIF89a\x01\x00"), "image/gif");
    }

    #[test]
    fn test_upload_mime_falls_back_to_png() {
        assert_eq!(upload_mime(b"%PDF-1.7"), "image/png");
        assert_eq!(upload_mime(&[]), "image/png");
    }
}
