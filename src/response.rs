//! Payload variants and their fixed response headers.
//!
//! Every successful exchange is two writes: the variant's header, then the
//! payload bytes. Nothing in the header depends on the payload, so there is
//! no computed `Content-Length`.
//!
//! ## Wire Format
//!
//! ```text
//! HTTP/1.1 200 OK\n
//! Content-Type: application/json\n
//! Access-Control-Allow-Origin: *\n
//! \n
//! <payload bytes>
//! ```
//!
//! Lines end in a bare `\n`, not `\r\n`, so existing clients of the
//! responder see byte-identical output.

use clap::ValueEnum;
use serde::Deserialize;
use std::path::Path;

/// Header sent before a JSON payload.
pub const JSON_HEADER: &[u8] =
    b"HTTP/1.1 200 OK\nContent-Type: application/json\nAccess-Control-Allow-Origin: *\n\n";

/// Header sent before an HTML payload.
pub const HTML_HEADER: &[u8] = b"HTTP/1.1 200 OK\nContent-Type: text/html\n\n";

/// Payload capacity shared by both variants.
pub const PAYLOAD_CAPACITY: usize = 4096;

/// Which compiled-in file is served, and with which header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// `data.json` served as `application/json` with a permissive CORS line.
    #[default]
    Json,
    /// `index.html` served as `text/html`.
    Html,
}

impl Variant {
    /// Relative path of the payload file, resolved against the working directory.
    pub fn payload_path(self) -> &'static Path {
        match self {
            Variant::Json => Path::new("data.json"),
            Variant::Html => Path::new("index.html"),
        }
    }

    /// The complete response header, blank line included.
    pub fn header(self) -> &'static [u8] {
        match self {
            Variant::Json => JSON_HEADER,
            Variant::Html => HTML_HEADER,
        }
    }

    /// Media type named in the header's `Content-Type` line.
    pub fn content_type(self) -> &'static str {
        match self {
            Variant::Json => "application/json",
            Variant::Html => "text/html",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_header_bytes() {
        assert_eq!(
            Variant::Json.header(),
            b"HTTP/1.1 200 OK\nContent-Type: application/json\nAccess-Control-Allow-Origin: *\n\n"
        );
        assert_eq!(Variant::Json.payload_path(), Path::new("data.json"));
    }

    #[test]
    fn test_html_header_has_no_cors_line() {
        let header = std::str::from_utf8(Variant::Html.header()).unwrap();
        assert!(!header.contains("Access-Control-Allow-Origin"));
        assert_eq!(Variant::Html.payload_path(), Path::new("index.html"));
    }

    #[test]
    fn test_headers_use_bare_newlines() {
        for variant in [Variant::Json, Variant::Html] {
            let header = variant.header();
            assert!(!header.contains(&b'\r'));
            assert!(header.ends_with(b"\n\n"));
            assert!(header.starts_with(b"HTTP/1.1 200 OK\n"));
            let text = std::str::from_utf8(header).unwrap();
            assert!(text.contains(&format!("Content-Type: {}\n", variant.content_type())));
        }
    }
}
