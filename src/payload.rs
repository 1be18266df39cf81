//! Request body construction.
//!
//! The payload is a tagged variant: callers hand the client raw bytes, a
//! string, a form mapping, or an explicitly serialized record, and the
//! client derives the Content-Type from the variant (sniffing raw data,
//! probing strings for JSON/XML/form shapes).

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::sniff::detect_content_type;

/// A request body with enough type information to pick a Content-Type.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    /// No body.
    #[default]
    Empty,
    /// Raw bytes; Content-Type sniffed from the byte signature table.
    Raw(Vec<u8>),
    /// Text; probed for JSON/XML, falling back to sniffing. Plain text
    /// containing `=` or `&` is sent as a URL-encoded form.
    Text(String),
    /// Key/value pairs sent as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
    /// A JSON document.
    Json(serde_json::Value),
    /// A pre-serialized XML document.
    Xml(String),
}

impl Payload {
    /// Serialize a record as a JSON payload.
    pub fn json<T: Serialize>(data: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(data)?))
    }

    /// Serialize a record as an XML payload.
    pub fn xml<T: Serialize>(data: &T) -> Result<Self> {
        let text = quick_xml::se::to_string(data).map_err(|e| Error::Xml(e.to_string()))?;
        Ok(Self::Xml(text))
    }

    /// Whether the payload carries no body.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Resolve the payload into body bytes and a Content-Type.
    pub(crate) fn into_parts(self) -> Result<(Option<Bytes>, Option<String>)> {
        match self {
            Self::Empty => Ok((None, None)),
            Self::Raw(data) => {
                let content_type = detect_content_type(&data).to_string();
                Ok((Some(Bytes::from(data)), Some(content_type)))
            }
            Self::Text(text) => {
                let content_type = detect_text_content_type(&text);
                Ok((Some(Bytes::from(text)), Some(content_type)))
            }
            Self::Form(pairs) => {
                let mut encoder = url::form_urlencoded::Serializer::new(String::new());
                for (key, value) in &pairs {
                    encoder.append_pair(key, value);
                }
                Ok((
                    Some(Bytes::from(encoder.finish())),
                    Some("application/x-www-form-urlencoded".to_string()),
                ))
            }
            Self::Json(value) => Ok((
                Some(Bytes::from(serde_json::to_vec(&value)?)),
                Some("application/json; charset=utf-8".to_string()),
            )),
            Self::Xml(text) => Ok((
                Some(Bytes::from(text)),
                Some("application/xml; charset=utf-8".to_string()),
            )),
        }
    }
}

/// Probe a string body for its content type.
///
/// JSON and XML are recognized by attempting a parse; otherwise the byte
/// signature table applies, with plain text containing `=` or `&`
/// reinterpreted as a URL-encoded form.
fn detect_text_content_type(text: &str) -> String {
    if serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok() {
        return "application/json; charset=utf-8".to_string();
    }
    if is_well_formed_xml(text) {
        return "application/xml; charset=utf-8".to_string();
    }

    let sniffed = detect_content_type(text.as_bytes());
    if sniffed == "text/plain; charset=utf-8" && text.contains(['=', '&']) {
        return "application/x-www-form-urlencoded".to_string();
    }

    sniffed.to_string()
}

fn is_well_formed_xml(text: &str) -> bool {
    let mut reader = quick_xml::Reader::from_str(text);
    let mut saw_element = false;
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Start(_) | quick_xml::events::Event::Empty(_)) => {
                saw_element = true;
            }
            Ok(quick_xml::events::Event::Eof) => return saw_element,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self::Raw(data)
    }
}

impl From<&[u8]> for Payload {
    fn from(data: &[u8]) -> Self {
        Self::Raw(data.to_vec())
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Self::Raw(data.to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<HashMap<String, String>> for Payload {
    fn from(map: HashMap<String, String>) -> Self {
        Self::Form(map.into_iter().collect())
    }
}

impl From<BTreeMap<String, String>> for Payload {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::Form(map.into_iter().collect())
    }
}

impl From<Vec<(String, String)>> for Payload {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self::Form(pairs)
    }
}

impl From<&[(&str, &str)]> for Payload {
    fn from(pairs: &[(&str, &str)]) -> Self {
        Self::Form(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Payload {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self::Form(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_encoding() {
        let payload = Payload::from([("aaa", "bbb"), ("ddd", "c c")]);
        let (body, content_type) = payload.into_parts().unwrap();
        assert_eq!(
            content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
        let body = body.unwrap();
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("aaa=bbb"));
        assert!(text.contains("ddd=c+c"));
    }

    #[test]
    fn test_text_form_detection() {
        let (_, content_type) = Payload::from("test=data&x=y").into_parts().unwrap();
        assert_eq!(
            content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn test_text_json_detection() {
        let (_, content_type) = Payload::from(r#"{"a": 1}"#).into_parts().unwrap();
        assert_eq!(content_type.as_deref(), Some("application/json; charset=utf-8"));
    }

    #[test]
    fn test_text_xml_detection() {
        let (_, content_type) = Payload::from("<root><a>1</a></root>").into_parts().unwrap();
        assert_eq!(content_type.as_deref(), Some("application/xml; charset=utf-8"));
    }

    #[test]
    fn test_plain_text() {
        let (_, content_type) = Payload::from("just words").into_parts().unwrap();
        assert_eq!(content_type.as_deref(), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn test_raw_bytes_sniffed() {
        let (_, content_type) = Payload::from(b"\x89PNG\r\n\x1A\n".as_slice())
            .into_parts()
            .unwrap();
        assert_eq!(content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_typed_json() {
        #[derive(Serialize)]
        struct Login {
            user: String,
        }
        let payload = Payload::json(&Login {
            user: "root".into(),
        })
        .unwrap();
        let (body, content_type) = payload.into_parts().unwrap();
        assert_eq!(content_type.as_deref(), Some("application/json; charset=utf-8"));
        assert_eq!(body.unwrap().as_ref(), br#"{"user":"root"}"#);
    }

    #[test]
    fn test_empty() {
        let (body, content_type) = Payload::Empty.into_parts().unwrap();
        assert!(body.is_none());
        assert!(content_type.is_none());
    }
}
