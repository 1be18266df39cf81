//! Content-type detection from leading body bytes.
//!
//! Implements the byte-signature table of the standard HTTP content
//! sniffing algorithm: at most 512 bytes are considered, signatures are
//! tried in order, and the fallback distinguishes `text/plain` from
//! `application/octet-stream` by scanning for binary control bytes.

/// Maximum number of leading bytes considered by the detector.
const SNIFF_LEN: usize = 512;

/// The fallback type when nothing else matches and binary bytes exist.
pub const OCTET_STREAM: &str = "application/octet-stream";

enum Signature {
    /// Exact prefix match.
    Exact {
        sig: &'static [u8],
        content_type: &'static str,
    },
    /// Byte-masked prefix match.
    Masked {
        mask: &'static [u8],
        pattern: &'static [u8],
        skip_ws: bool,
        content_type: &'static str,
    },
    /// Case-insensitive HTML tag; the byte following the tag must be a
    /// space or `>`.
    Html { tag: &'static [u8] },
    /// ISO BMFF `ftyp` box (mp4 family).
    Mp4,
}

const SIGNATURES: &[Signature] = &[
    Signature::Html { tag: b"<!DOCTYPE HTML" },
    Signature::Html { tag: b"<HTML" },
    Signature::Html { tag: b"<HEAD" },
    Signature::Html { tag: b"<SCRIPT" },
    Signature::Html { tag: b"<IFRAME" },
    Signature::Html { tag: b"<H1" },
    Signature::Html { tag: b"<DIV" },
    Signature::Html { tag: b"<FONT" },
    Signature::Html { tag: b"<TABLE" },
    Signature::Html { tag: b"<A" },
    Signature::Html { tag: b"<STYLE" },
    Signature::Html { tag: b"<TITLE" },
    Signature::Html { tag: b"<B" },
    Signature::Html { tag: b"<BODY" },
    Signature::Html { tag: b"<BR" },
    Signature::Html { tag: b"<P" },
    Signature::Html { tag: b"<!--" },
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\xFF",
        pattern: b"<?xml",
        skip_ws: true,
        content_type: "text/xml; charset=utf-8",
    },
    Signature::Exact { sig: b"%PDF-", content_type: "application/pdf" },
    Signature::Exact { sig: b"%!PS-Adobe-", content_type: "application/postscript" },
    // UTF byte-order marks.
    Signature::Masked {
        mask: b"\xFF\xFF\x00\x00",
        pattern: b"\xFE\xFF\x00\x00",
        skip_ws: false,
        content_type: "text/plain; charset=utf-16be",
    },
    Signature::Masked {
        mask: b"\xFF\xFF\x00\x00",
        pattern: b"\xFF\xFE\x00\x00",
        skip_ws: false,
        content_type: "text/plain; charset=utf-16le",
    },
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\x00",
        pattern: b"\xEF\xBB\xBF\x00",
        skip_ws: false,
        content_type: "text/plain; charset=utf-8",
    },
    // Images.
    Signature::Exact { sig: b"GIF87a", content_type: "image/gif" },
    Signature::Exact { sig: b"GIF89a", content_type: "image/gif" },
    Signature::Exact { sig: b"\x89PNG\r\n\x1A\n", content_type: "image/png" },
    Signature::Exact { sig: b"\xFF\xD8\xFF", content_type: "image/jpeg" },
    Signature::Exact { sig: b"BM", content_type: "image/bmp" },
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00WEBPVP",
        skip_ws: false,
        content_type: "image/webp",
    },
    Signature::Exact { sig: b"\x00\x00\x01\x00", content_type: "image/x-icon" },
    Signature::Exact { sig: b"\x00\x00\x02\x00", content_type: "image/x-icon" },
    // Audio and video.
    Signature::Exact { sig: b".snd", content_type: "audio/basic" },
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"FORM\x00\x00\x00\x00AIFF",
        skip_ws: false,
        content_type: "audio/aiff",
    },
    Signature::Exact { sig: b"ID3", content_type: "audio/mpeg" },
    Signature::Exact { sig: b"OggS\x00", content_type: "application/ogg" },
    Signature::Exact { sig: b"MThd\x00\x00\x00\x06", content_type: "audio/midi" },
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00AVI ",
        skip_ws: false,
        content_type: "video/avi",
    },
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00WAVE",
        skip_ws: false,
        content_type: "audio/wave",
    },
    Signature::Mp4,
    Signature::Exact { sig: b"\x1A\x45\xDF\xA3", content_type: "video/webm" },
    // Fonts.
    Signature::Exact { sig: b"\x00\x01\x00\x00", content_type: "font/ttf" },
    Signature::Exact { sig: b"OTTO", content_type: "font/otf" },
    Signature::Exact { sig: b"ttcf", content_type: "font/collection" },
    Signature::Exact { sig: b"wOFF", content_type: "font/woff" },
    Signature::Exact { sig: b"wOF2", content_type: "font/woff2" },
    // Archives.
    Signature::Exact { sig: b"\x1F\x8B\x08", content_type: "application/x-gzip" },
    Signature::Exact { sig: b"PK\x03\x04", content_type: "application/zip" },
    Signature::Exact { sig: b"Rar!\x1A\x07\x00", content_type: "application/x-rar-compressed" },
    Signature::Exact { sig: b"Rar!\x1A\x07\x01\x00", content_type: "application/x-rar-compressed" },
    Signature::Exact { sig: b"\x00asm", content_type: "application/wasm" },
];

/// Detect the content type of `data` from its leading bytes.
///
/// Always returns a valid media type; the fallbacks are
/// `text/plain; charset=utf-8` and `application/octet-stream`.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];

    for sig in SIGNATURES {
        if let Some(ct) = match_signature(sig, data) {
            return ct;
        }
    }

    if data.iter().any(|&b| is_binary_byte(b)) {
        OCTET_STREAM
    } else {
        "text/plain; charset=utf-8"
    }
}

fn match_signature(sig: &Signature, data: &[u8]) -> Option<&'static str> {
    match sig {
        Signature::Exact { sig, content_type } => {
            data.starts_with(sig).then_some(*content_type)
        }
        Signature::Masked {
            mask,
            pattern,
            skip_ws,
            content_type,
        } => {
            let data = if *skip_ws { skip_whitespace(data) } else { data };
            if data.len() < mask.len() {
                return None;
            }
            for ((&d, &m), &p) in data.iter().zip(mask.iter()).zip(pattern.iter()) {
                if d & m != p {
                    return None;
                }
            }
            Some(content_type)
        }
        Signature::Html { tag } => {
            let data = skip_whitespace(data);
            if data.len() < tag.len() + 1 {
                return None;
            }
            for (&d, &t) in data.iter().zip(tag.iter()) {
                if d.to_ascii_uppercase() != t {
                    return None;
                }
            }
            // The tag must be terminated by a space or '>'.
            matches!(data[tag.len()], b' ' | b'>').then_some("text/html; charset=utf-8")
        }
        Signature::Mp4 => sniff_mp4(data),
    }
}

/// ISO BMFF detection: a size-prefixed `ftyp` box whose major or compatible
/// brands start with `mp4`.
fn sniff_mp4(data: &[u8]) -> Option<&'static str> {
    if data.len() < 12 {
        return None;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if box_size % 4 != 0 || data.len() < box_size || &data[4..8] != b"ftyp" {
        return None;
    }
    let mut offset = 8;
    while offset + 4 <= box_size {
        // Offset 12..16 is the version number, not a brand.
        if offset != 12 && data.get(offset..offset + 3) == Some(b"mp4".as_ref()) {
            return Some("video/mp4");
        }
        offset += 4;
    }
    None
}

fn skip_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

/// Control bytes that mark data as binary for the text/plain fallback.
fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}
