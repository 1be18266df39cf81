//! Response body handling.
//!
//! A body is read from the wire once. Terminal reads (`bytes`, `string`,
//! `json`, `xml`, `md5`, `dump`) consume the underlying buffer unless body
//! caching was enabled, in which case the decoded content is retained and
//! every terminal read returns it. Content decoding (deflate, gzip, br,
//! zstd) and the byte limit apply at read time.

use std::io::Read;
use std::path::Path;
use std::sync::Mutex;

use bytes::Bytes;
use md5::{Digest, Md5};
use regex::Regex;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

/// Sentinel meaning "no byte limit".
pub const UNLIMITED: i64 = -1;

/// Lazily-consumed response body.
#[derive(Debug)]
pub struct Body {
    state: Mutex<BodyState>,
    content_type: String,
    encoding: Option<String>,
    cache: bool,
}

#[derive(Debug)]
struct BodyState {
    raw: Option<Bytes>,
    cached: Option<Bytes>,
    limit: i64,
}

impl Body {
    pub(crate) fn new(
        raw: Bytes,
        content_type: String,
        encoding: Option<String>,
        cache: bool,
    ) -> Self {
        Self {
            state: Mutex::new(BodyState {
                raw: Some(raw),
                cached: None,
                limit: UNLIMITED,
            }),
            content_type,
            encoding: encoding.map(|e| e.to_lowercase()),
            cache,
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Bytes::new(), String::new(), None, false)
    }

    /// The response Content-Type.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Whether the payload arrived deflate-encoded.
    pub fn deflate(&self) -> bool {
        self.encoding.as_deref() == Some("deflate")
    }

    /// Cap subsequent reads at `n` bytes; [`UNLIMITED`] removes the cap.
    pub fn limit(&self, n: i64) -> &Self {
        self.state.lock().expect("body lock poisoned").limit = n;
        self
    }

    /// Decoded content bytes.
    ///
    /// Consumes the body; a second call returns empty unless caching is
    /// enabled.
    pub fn bytes(&self) -> Result<Bytes> {
        let mut state = self.state.lock().expect("body lock poisoned");

        if self.cache {
            if let Some(cached) = &state.cached {
                return Ok(cached.clone());
            }
        }

        let Some(raw) = state.raw.take() else {
            return Ok(Bytes::new());
        };

        let mut content = decode(&raw, self.encoding.as_deref())?;
        if state.limit >= 0 {
            content.truncate(state.limit as usize);
        }

        let content = Bytes::from(content);
        if self.cache {
            state.cached = Some(content.clone());
        }

        Ok(content)
    }

    /// Decoded content as a string (lossy UTF-8).
    pub fn string(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.bytes()?).into_owned())
    }

    /// Deserialize the content as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.bytes()?)?)
    }

    /// Deserialize the content as XML.
    pub fn xml<T: DeserializeOwned>(&self) -> Result<T> {
        quick_xml::de::from_str(&self.string()?).map_err(|e| Error::Xml(e.to_string()))
    }

    /// Take the raw (undecoded) content as a buffered async reader.
    /// The caller owns the stream from here on.
    pub fn stream(&self) -> tokio::io::BufReader<std::io::Cursor<Bytes>> {
        let raw = self
            .state
            .lock()
            .expect("body lock poisoned")
            .raw
            .take()
            .unwrap_or_default();
        tokio::io::BufReader::new(std::io::Cursor::new(raw))
    }

    /// Content converted to UTF-8 using the Content-Type charset; falls
    /// back to the lossy string when the charset is missing or unknown.
    pub fn utf8(&self) -> Result<String> {
        let bytes = self.bytes()?;

        let Some(charset) = charset_of(&self.content_type) else {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        };
        let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) else {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        };

        let (text, _, _) = encoding.decode(&bytes);
        Ok(text.into_owned())
    }

    /// MD5 hex digest of the decoded content.
    pub fn md5(&self) -> Result<String> {
        Ok(hex::encode(Md5::digest(self.bytes()?)))
    }

    /// Write the raw content to `path`, creating parent directories and
    /// syncing the file.
    pub async fn dump(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = {
            self.state
                .lock()
                .expect("body lock poisoned")
                .raw
                .take()
                .unwrap_or_default()
        };

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(&raw).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Whether the content matches a pattern. String and byte patterns
    /// match case-insensitively as literals; regex patterns match as-is.
    pub fn contains(&self, pattern: impl BodyPattern) -> bool {
        self.bytes()
            .map(|bytes| pattern.matches_content(&bytes))
            .unwrap_or(false)
    }

    /// Discard any unread content. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.state.lock().expect("body lock poisoned").raw = None;
        Ok(())
    }
}

/// A pattern the body content can be tested against.
pub trait BodyPattern {
    fn matches_content(&self, content: &[u8]) -> bool;
}

impl BodyPattern for &str {
    fn matches_content(&self, content: &[u8]) -> bool {
        String::from_utf8_lossy(content)
            .to_lowercase()
            .contains(&self.to_lowercase())
    }
}

impl BodyPattern for String {
    fn matches_content(&self, content: &[u8]) -> bool {
        self.as_str().matches_content(content)
    }
}

impl BodyPattern for &[u8] {
    fn matches_content(&self, content: &[u8]) -> bool {
        let needle = self.to_ascii_lowercase();
        content
            .to_ascii_lowercase()
            .windows(needle.len().max(1))
            .any(|w| w == needle.as_slice())
    }
}

impl BodyPattern for &Regex {
    fn matches_content(&self, content: &[u8]) -> bool {
        self.is_match(&String::from_utf8_lossy(content))
    }
}

/// Decode content per its Content-Encoding.
fn decode(raw: &[u8], encoding: Option<&str>) -> Result<Vec<u8>> {
    match encoding {
        Some("deflate") => {
            // zlib-wrapped first; some servers send raw deflate.
            let mut decoded = Vec::new();
            if flate2::read::ZlibDecoder::new(raw)
                .read_to_end(&mut decoded)
                .is_ok()
            {
                return Ok(decoded);
            }
            decoded.clear();
            flate2::read::DeflateDecoder::new(raw)
                .read_to_end(&mut decoded)
                .map_err(|e| Error::body(format!("deflate: {e}")))?;
            Ok(decoded)
        }
        Some("gzip") | Some("x-gzip") => {
            let mut decoded = Vec::new();
            flate2::read::GzDecoder::new(raw)
                .read_to_end(&mut decoded)
                .map_err(|e| Error::body(format!("gzip: {e}")))?;
            Ok(decoded)
        }
        Some("br") => {
            let mut decoded = Vec::new();
            brotli::Decompressor::new(raw, 4096)
                .read_to_end(&mut decoded)
                .map_err(|e| Error::body(format!("brotli: {e}")))?;
            Ok(decoded)
        }
        Some("zstd") => zstd::stream::decode_all(raw)
            .map_err(|e| Error::body(format!("zstd: {e}"))),
        _ => Ok(raw.to_vec()),
    }
}

/// Extract the charset parameter of a media type, e.g.
/// `text/html; charset=windows-1251` → `windows-1251`.
fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}
