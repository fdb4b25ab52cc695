// Image format and pixel size from the leading bytes.

use crate::units::CONTENT_WIDTH_PT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Gif => "gif",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

pub fn sniff(bytes: &[u8]) -> Option<ImageInfo> {
    png_info(bytes).or_else(|| jpeg_info(bytes)).or_else(|| gif_info(bytes))
}

fn png_info(bytes: &[u8]) -> Option<ImageInfo> {
    const SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";
    if bytes.len() < 24 || &bytes[..8] != SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    nonzero(ImageFormat::Png, width, height)
}

fn gif_info(bytes: &[u8]) -> Option<ImageInfo> {
    if bytes.len() < 10 || (&bytes[..6] != b"GIF87a" && &bytes[..6] != b"GIF89a") {
        return None;
    }
    let width = u16::from_le_bytes([bytes[6], bytes[7]]);
    let height = u16::from_le_bytes([bytes[8], bytes[9]]);
    nonzero(ImageFormat::Gif, width.into(), height.into())
}

fn jpeg_info(bytes: &[u8]) -> Option<ImageInfo> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }
    let mut i = 2usize;
    while i + 1 < bytes.len() {
        while i < bytes.len() && bytes[i] != 0xFF {
            i += 1;
        }
        while i < bytes.len() && bytes[i] == 0xFF {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let marker = bytes[i];
        i += 1;
        if marker == 0xD9 || marker == 0xDA || i + 1 >= bytes.len() {
            break;
        }
        let seg_len = usize::from(u16::from_be_bytes([bytes[i], bytes[i + 1]]));
        if seg_len < 2 {
            break;
        }
        let payload = i + 2;
        let end = i.saturating_add(seg_len);
        if end > bytes.len() {
            break;
        }
        if is_sof(marker) && seg_len >= 7 {
            let height = u16::from_be_bytes([bytes[payload + 1], bytes[payload + 2]]);
            let width = u16::from_be_bytes([bytes[payload + 3], bytes[payload + 4]]);
            return nonzero(ImageFormat::Jpeg, width.into(), height.into());
        }
        i = end;
    }
    None
}

fn is_sof(marker: u8) -> bool {
    matches!(
        marker,
        0xC0 | 0xC1 | 0xC2 | 0xC3 | 0xC5 | 0xC6 | 0xC7 | 0xC9 | 0xCA | 0xCB | 0xCD | 0xCE | 0xCF
    )
}

fn nonzero(format: ImageFormat, width: u32, height: u32) -> Option<ImageInfo> {
    (width > 0 && height > 0).then_some(ImageInfo { format, width, height })
}

/// Display size in points. A single given dimension keeps the aspect ratio;
/// none given means one CSS pixel per image pixel. Wider than the text
/// column scales down to fit.
pub fn display_size(info: &ImageInfo, width: Option<f32>, height: Option<f32>) -> (f32, f32) {
    let natural_w = info.width as f32 * 0.75;
    let natural_h = info.height as f32 * 0.75;
    let (w, h) = match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, w * natural_h / natural_w),
        (None, Some(h)) => (h * natural_w / natural_h, h),
        (None, None) => (natural_w, natural_h),
    };
    if w > CONTENT_WIDTH_PT {
        (CONTENT_WIDTH_PT, h * CONTENT_WIDTH_PT / w)
    } else {
        (w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = b"\x89PNG\r\n\x1a\n\0\0\0\x0dIHDR".to_vec();
        out.extend_from_slice(&width.to_be_bytes());
        out.extend_from_slice(&height.to_be_bytes());
        out.extend_from_slice(&[8, 6, 0, 0, 0]);
        out
    }

    #[test]
    fn sniffs_png_gif_and_jpeg() {
        assert_eq!(
            sniff(&png(40, 20)),
            Some(ImageInfo {
                format: ImageFormat::Png,
                width: 40,
                height: 20
            })
        );

        let mut gif = b"GIF89a".to_vec();
        gif.extend_from_slice(&[3, 0, 2, 0, 0]);
        assert_eq!(sniff(&gif).map(|i| (i.format, i.width, i.height)), Some((ImageFormat::Gif, 3, 2)));

        let jpeg = [
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00, // APP0
            0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x10, 0x00, 0x20, 0x01, 0x01, 0x11, 0x00,
        ];
        assert_eq!(sniff(&jpeg).map(|i| (i.format, i.width, i.height)), Some((ImageFormat::Jpeg, 32, 16)));
    }

    #[test]
    fn rejects_unknown_and_empty() {
        assert_eq!(sniff(b"hello world, not an image"), None);
        assert_eq!(sniff(&png(0, 10)), None);
        assert_eq!(sniff(&[]), None);
    }

    #[test]
    fn display_size_keeps_ratio() {
        let info = sniff(&png(200, 100)).unwrap();
        assert_eq!(display_size(&info, None, None), (150.0, 75.0));
        assert_eq!(display_size(&info, Some(60.0), None), (60.0, 30.0));
        assert_eq!(display_size(&info, None, Some(60.0)), (120.0, 60.0));
        assert_eq!(display_size(&info, Some(10.0), Some(10.0)), (10.0, 10.0));
    }

    #[test]
    fn wide_images_fit_the_column() {
        let info = sniff(&png(1248, 624)).unwrap();
        assert_eq!(display_size(&info, None, None), (468.0, 234.0));
    }
}
