//! Content type sniffing from leading bytes.
//!
//! Follows the WHATWG MIME sniffing order: markup first, then binary
//! signatures, then a plain text fallback when no binary bytes are present.

use std::io::SeekFrom;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Bytes inspected per stream.
pub const SNIFF_LEN: usize = 512;

/// Fallback for content without a recognized signature.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Fallback for content without binary bytes.
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

const HTML: &str = "text/html; charset=utf-8";

enum Signature {
    /// Prefix match.
    Exact(&'static [u8], &'static str),
    /// `data & mask == pattern` over the pattern length.
    Masked {
        mask: &'static [u8],
        pattern: &'static [u8],
        skip_ws: bool,
        mime: &'static str,
    },
    /// Case-insensitive tag followed by a space or `>`.
    Html(&'static [u8]),
    /// ISO base media file with an `mp4` brand.
    Mp4,
    /// No binary bytes at all.
    Text,
}

const SIGNATURES: &[Signature] = &[
    Signature::Html(b"<!DOCTYPE HTML"),
    Signature::Html(b"<HTML"),
    Signature::Html(b"<HEAD"),
    Signature::Html(b"<SCRIPT"),
    Signature::Html(b"<IFRAME"),
    Signature::Html(b"<H1"),
    Signature::Html(b"<DIV"),
    Signature::Html(b"<FONT"),
    Signature::Html(b"<TABLE"),
    Signature::Html(b"<A"),
    Signature::Html(b"<STYLE"),
    Signature::Html(b"<TITLE"),
    Signature::Html(b"<B"),
    Signature::Html(b"<BODY"),
    Signature::Html(b"<BR"),
    Signature::Html(b"<P"),
    Signature::Html(b"<!--"),
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\xFF",
        pattern: b"<?xml",
        skip_ws: true,
        mime: "text/xml; charset=utf-8",
    },
    Signature::Exact(b"%PDF-", "application/pdf"),
    Signature::Exact(b"%!PS-Adobe-", "application/postscript"),
    // Byte order marks.
    Signature::Exact(b"\xFE\xFF", "text/plain; charset=utf-16be"),
    Signature::Exact(b"\xFF\xFE", "text/plain; charset=utf-16le"),
    Signature::Exact(b"\xEF\xBB\xBF", TEXT_PLAIN),
    // Images.
    Signature::Exact(b"\x00\x00\x01\x00", "image/x-icon"),
    Signature::Exact(b"\x00\x00\x02\x00", "image/x-icon"),
    Signature::Exact(b"BM", "image/bmp"),
    Signature::Exact(b"GIF87a", "image/gif"),
    Signature::Exact(b"GIF89a", "image/gif"),
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00WEBPVP",
        skip_ws: false,
        mime: "image/webp",
    },
    Signature::Exact(b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    Signature::Exact(b"\xFF\xD8\xFF", "image/jpeg"),
    // Audio and video.
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"FORM\x00\x00\x00\x00AIFF",
        skip_ws: false,
        mime: "audio/aiff",
    },
    Signature::Exact(b"ID3", "audio/mpeg"),
    Signature::Exact(b"OggS\x00", "application/ogg"),
    Signature::Exact(b"MThd\x00\x00\x00\x06", "audio/midi"),
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00AVI ",
        skip_ws: false,
        mime: "video/avi",
    },
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00WAVE",
        skip_ws: false,
        mime: "audio/wave",
    },
    Signature::Mp4,
    Signature::Exact(b"\x1A\x45\xDF\xA3", "video/webm"),
    // Fonts.
    Signature::Masked {
        mask: b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\xFF\xFF",
        pattern: b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00LP",
        skip_ws: false,
        mime: "application/vnd.ms-fontobject",
    },
    Signature::Exact(b"\x00\x01\x00\x00", "font/ttf"),
    Signature::Exact(b"OTTO", "font/otf"),
    Signature::Exact(b"ttcf", "font/collection"),
    Signature::Exact(b"wOFF", "font/woff"),
    Signature::Exact(b"wOF2", "font/woff2"),
    // Archives.
    Signature::Exact(b"\x1F\x8B\x08", "application/x-gzip"),
    Signature::Exact(b"PK\x03\x04", "application/zip"),
    Signature::Exact(b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    Signature::Exact(b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    Signature::Exact(b"7z\xBC\xAF\x27\x1C", "application/x-7z-compressed"),
    Signature::Exact(b"\x00\x61\x73\x6D", "application/wasm"),
    Signature::Text,
];

fn is_ws(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

fn is_tag_terminator(b: u8) -> bool {
    b == b' ' || b == b'>'
}

fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

fn skip_ws(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|&b| !is_ws(b)).unwrap_or(data.len());
    &data[start..]
}

fn matches_mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() < box_size || box_size % 4 != 0 || &data[4..8] != b"ftyp" {
        return false;
    }
    (8..box_size)
        .step_by(4)
        // Bytes 12..16 carry the minor version, not a brand.
        .filter(|&offset| offset != 12)
        .any(|offset| data.get(offset..offset + 3) == Some(b"mp4".as_slice()))
}

impl Signature {
    fn matches(&self, data: &[u8]) -> Option<&'static str> {
        match self {
            Self::Exact(prefix, mime) => data.starts_with(prefix).then_some(*mime),
            Self::Masked {
                mask,
                pattern,
                skip_ws: skip,
                mime,
            } => {
                let data = if *skip { skip_ws(data) } else { data };
                if data.len() < pattern.len() {
                    return None;
                }
                pattern
                    .iter()
                    .zip(mask.iter())
                    .zip(data)
                    .all(|((p, m), d)| d & m == *p)
                    .then_some(*mime)
            }
            Self::Html(tag) => {
                let data = skip_ws(data);
                if data.len() < tag.len() + 1 {
                    return None;
                }
                let head_matches = tag.iter().zip(data).all(|(t, d)| {
                    if t.is_ascii_uppercase() {
                        d & 0xDF == *t
                    } else {
                        d == t
                    }
                });
                (head_matches && is_tag_terminator(data[tag.len()])).then_some(HTML)
            }
            Self::Mp4 => matches_mp4(data).then_some("video/mp4"),
            Self::Text => (!data.iter().copied().any(is_binary)).then_some(TEXT_PLAIN),
        }
    }
}

/// Classifies `data` by its first [`SNIFF_LEN`] bytes.
#[must_use]
pub fn sniff(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];
    SIGNATURES
        .iter()
        .find_map(|sig| sig.matches(data))
        .unwrap_or(OCTET_STREAM)
}

/// Reads up to [`SNIFF_LEN`] bytes from the start of `reader`, rewinds it to
/// offset zero and classifies the bytes read.
///
/// # Errors
///
/// Returns an error if reading or seeking fails.
pub async fn detect<R>(reader: &mut R) -> std::io::Result<&'static str>
where
    R: AsyncRead + AsyncSeek + Unpin + ?Sized,
{
    reader.seek(SeekFrom::Start(0)).await?;

    let mut header = [0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < SNIFF_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    reader.seek(SeekFrom::Start(0)).await?;
    Ok(sniff(&header[..filled]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;

    const JPEG_HEADER: &[u8] = b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00\x01\x01\x00\x00\x01\x00\x01\x00\x00";

    #[rstest]
    #[case(JPEG_HEADER, "image/jpeg")]
    #[case(b"\x89PNG\x0D\x0A\x1A\x0A\x00\x00\x00\x0DIHDR", "image/png")]
    #[case(b"GIF89a\x01\x00\x01\x00", "image/gif")]
    #[case(b"RIFF\x24\x00\x00\x00WEBPVP8 ", "image/webp")]
    #[case(b"RIFF\x24\x00\x00\x00WAVEfmt ", "audio/wave")]
    #[case(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3", "application/pdf")]
    #[case(b"PK\x03\x04\x14\x00\x06\x00", "application/zip")]
    #[case(b"\x1F\x8B\x08\x00\x00\x00\x00\x00", "application/x-gzip")]
    #[case(b"ID3\x04\x00\x00\x00\x00\x00\x00", "audio/mpeg")]
    #[case(b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00mp42isom", "video/mp4")]
    #[case(b"  <!doctype html><html>", "text/html; charset=utf-8")]
    #[case(b"<p>hello</p>", "text/html; charset=utf-8")]
    #[case(b"\n<?xml version=\"1.0\"?>", "text/xml; charset=utf-8")]
    #[case(b"plain old text, nothing fancy", "text/plain; charset=utf-8")]
    #[case(b"\xEF\xBB\xBFbom text", "text/plain; charset=utf-8")]
    #[case(b"", "text/plain; charset=utf-8")]
    #[case(b"\x00\x01\x02\x03binary", "application/octet-stream")]
    fn test_sniff(#[case] data: &[u8], #[case] expected: &str) {
        assert_eq!(sniff(data), expected);
    }

    #[test]
    fn test_html_tag_needs_terminator() {
        // `<a` must be followed by a space or `>`.
        assert_eq!(sniff(b"<abc>"), TEXT_PLAIN);
        assert_eq!(sniff(b"<a href=\"x\">"), HTML);
    }

    #[test]
    fn test_eot_wins_over_truetype_header() {
        let mut data = vec![0u8; 256];
        data[..4].copy_from_slice(b"\x00\x01\x00\x00");
        data[34..36].copy_from_slice(b"LP");
        assert_eq!(sniff(&data), "application/vnd.ms-fontobject");

        data[34..36].copy_from_slice(b"\x00\x00");
        assert_eq!(sniff(&data), "font/ttf");
    }

    #[test]
    fn test_only_first_512_bytes_considered() {
        let mut data = vec![b'a'; SNIFF_LEN];
        data.push(0x00);
        assert_eq!(sniff(&data), TEXT_PLAIN);
    }

    #[tokio::test]
    async fn test_detect_rewinds_stream() {
        let mut body = JPEG_HEADER.to_vec();
        body.extend(std::iter::repeat_n(0xAB, 2048));
        let mut cursor = Cursor::new(body);

        let mime = detect(&mut cursor).await.expect("detect");

        assert_eq!(mime, "image/jpeg");
        assert_eq!(cursor.position(), 0);
    }

    #[tokio::test]
    async fn test_detect_rewinds_partially_consumed_stream() {
        let mut cursor = Cursor::new(b"%PDF-1.4 body".to_vec());
        cursor.set_position(5);

        let mime = detect(&mut cursor).await.expect("detect");

        assert_eq!(mime, "application/pdf");
        assert_eq!(cursor.position(), 0);
    }

    #[tokio::test]
    async fn test_detect_empty_stream() {
        let mut cursor = Cursor::new(Vec::new());
        assert_eq!(detect(&mut cursor).await.expect("detect"), TEXT_PLAIN);
        assert_eq!(cursor.position(), 0);
    }
}
