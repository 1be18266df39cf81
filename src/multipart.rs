//! multipart/form-data encoding for form and file-upload requests.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::sniff::detect_content_type;

/// Incrementally built multipart/form-data body.
pub struct MultipartForm {
    boundary: String,
    buffer: Vec<u8>,
}

impl MultipartForm {
    /// Start a form with a random boundary.
    pub fn new() -> Result<Self> {
        Ok(Self {
            boundary: random_boundary()?,
            buffer: Vec::new(),
        })
    }

    /// Append a plain text field.
    pub fn text_field(&mut self, name: &str, value: &str) {
        self.open_part();
        self.buffer.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        self.buffer.extend_from_slice(value.as_bytes());
        self.buffer.extend_from_slice(b"\r\n");
    }

    /// Append a file part; the part content type is sniffed from the data.
    pub fn file_field(&mut self, name: &str, file_name: &str, content: &[u8]) {
        let content_type = detect_content_type(content);
        self.open_part();
        self.buffer.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                 Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.buffer.extend_from_slice(content);
        self.buffer.extend_from_slice(b"\r\n");
    }

    /// Close the form, returning its Content-Type header value and body.
    pub fn finish(mut self) -> (String, Bytes) {
        self.buffer
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            Bytes::from(self.buffer),
        )
    }

    fn open_part(&mut self) {
        self.buffer
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
    }
}

fn random_boundary() -> Result<String> {
    let mut raw = [0u8; 15];
    getrandom::getrandom(&mut raw)
        .map_err(|e| Error::body(format!("boundary generation failed: {e}")))?;
    Ok(hex::encode(raw))
}
