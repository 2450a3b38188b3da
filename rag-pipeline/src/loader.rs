//! Loading raw source documents into text.
//!
//! Supported MIME types are `application/pdf` (with the `pdf` feature),
//! `text/plain`, `text/markdown` and `text/html`. When no MIME type is
//! declared it is guessed from the file extension.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::error::{RagError, Result};

/// MIME type of PDF documents.
pub const MIME_PDF: &str = "application/pdf";
/// MIME type of plain text.
pub const MIME_TEXT: &str = "text/plain";
/// MIME type of markdown, loaded as plain text.
pub const MIME_MARKDOWN: &str = "text/markdown";
/// MIME type of HTML pages.
pub const MIME_HTML: &str = "text/html";

/// Text extracted from a source, with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    /// File path or URL.
    pub source: String,
    /// Normalised MIME type the text was extracted from.
    pub mime_type: String,
    /// Extracted text.
    pub text: String,
}

/// Reads files or byte streams and extracts their text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentLoader;

impl DocumentLoader {
    /// Create a loader.
    pub fn new() -> Self {
        Self
    }

    /// Whether `mime_type` can be loaded.
    pub fn supports(mime_type: &str) -> bool {
        match normalize_mime(mime_type).as_str() {
            MIME_TEXT | MIME_MARKDOWN | "text/x-markdown" | MIME_HTML => true,
            MIME_PDF => cfg!(feature = "pdf"),
            _ => false,
        }
    }

    /// Guess a MIME type from a file extension.
    pub fn guess_mime(path: &Path) -> String {
        mime_guess::from_path(path)
            .first_raw()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }

    /// Load a file. `mime_type` overrides the extension-based guess.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::UnsupportedDocumentType`] before reading the file
    /// if the type is not supported, [`RagError::Io`] if the file cannot be
    /// read, and [`RagError::DocumentLoad`] if no text can be extracted.
    pub async fn load_path(
        &self,
        path: impl AsRef<Path>,
        mime_type: Option<&str>,
    ) -> Result<LoadedDocument> {
        let path = path.as_ref();
        let mime = match mime_type {
            Some(m) => normalize_mime(m),
            None => Self::guess_mime(path),
        };
        if !Self::supports(&mime) {
            return Err(RagError::UnsupportedDocumentType { mime_type: mime });
        }
        let bytes = tokio::fs::read(path).await?;
        self.load_bytes(path.display().to_string(), &bytes, &mime)
    }

    /// Extract text from an in-memory byte stream of the declared type.
    pub fn load_bytes(
        &self,
        source: impl Into<String>,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<LoadedDocument> {
        let source = source.into();
        let mime = normalize_mime(mime_type);

        let text = match mime.as_str() {
            MIME_TEXT | MIME_MARKDOWN | "text/x-markdown" => utf8(&source, bytes)?,
            MIME_HTML => html_to_text(&utf8(&source, bytes)?),
            MIME_PDF => pdf_to_text(&source, bytes)?,
            _ => return Err(RagError::UnsupportedDocumentType { mime_type: mime }),
        };

        debug!(source = %source, mime_type = %mime, text_len = text.len(), "loaded document");
        Ok(LoadedDocument { source, mime_type: mime, text })
    }
}

fn normalize_mime(mime_type: &str) -> String {
    mime_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

fn utf8(source: &str, bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| RagError::DocumentLoad {
        source_name: source.to_string(),
        message: format!("content is not valid UTF-8: {e}"),
    })
}

#[cfg(feature = "pdf")]
fn pdf_to_text(source: &str, bytes: &[u8]) -> Result<String> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| RagError::DocumentLoad {
        source_name: source.to_string(),
        message: format!("failed to extract PDF text: {e}"),
    })?;
    if text.trim().is_empty() {
        return Err(RagError::DocumentLoad {
            source_name: source.to_string(),
            message: "no text content extracted from PDF".to_string(),
        });
    }
    Ok(text)
}

#[cfg(not(feature = "pdf"))]
fn pdf_to_text(_source: &str, _bytes: &[u8]) -> Result<String> {
    Err(RagError::UnsupportedDocumentType { mime_type: MIME_PDF.to_string() })
}

static HIDDEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>",
        r"|<head\b.*?</head\s*>|<!--.*?-->",
    ))
    .expect("valid regex")
});
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<h([1-6])\b[^>]*>").expect("valid regex"));
static BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)</?(p|div|br|li|ul|ol|tr|table|thead|tbody|section|article|header|footer|nav",
        r"|blockquote|pre|h[1-6]|figure|figcaption)\b[^>]*>",
    ))
    .expect("valid regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid regex"));
static SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid regex"));

/// Strip markup from an HTML page, keeping block structure as line breaks
/// and headings as markdown-style `#` prefixes.
pub fn html_to_text(html: &str) -> String {
    let text = HIDDEN.replace_all(html, " ");
    let text = HEADING.replace_all(&text, |caps: &Captures<'_>| {
        let level: usize = caps[1].parse().unwrap_or(1);
        format!("\n{} ", "#".repeat(level))
    });
    let text = BLOCK.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, "");
    let text = ENTITY.replace_all(&text, |caps: &Captures<'_>| {
        decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });

    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = SPACES.replace_all(line.trim(), " ");
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 || out.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(&line);
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn decode_entity(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    let decoded = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "hellip" => "\u{2026}",
        _ => return None,
    };
    Some(decoded.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_markdown_load_verbatim() {
        let loader = DocumentLoader::new();
        let doc =
            loader.load_bytes("notes.txt", b"hello\nworld", "text/plain; charset=utf-8").unwrap();
        assert_eq!(doc.text, "hello\nworld");
        assert_eq!(doc.mime_type, "text/plain");

        let doc = loader.load_bytes("readme.md", b"# Title\nBody", "text/markdown").unwrap();
        assert_eq!(doc.text, "# Title\nBody");
    }

    #[test]
    fn unsupported_type_is_rejected() {
        let err =
            DocumentLoader::new().load_bytes("a.docx", b"PK", "application/msword").unwrap_err();
        assert!(matches!(
            err,
            RagError::UnsupportedDocumentType { mime_type } if mime_type == "application/msword"
        ));
    }

    #[test]
    fn invalid_utf8_is_a_load_error() {
        let err = DocumentLoader::new()
            .load_bytes("bin.txt", &[0xff, 0xfe, 0x00], MIME_TEXT)
            .unwrap_err();
        assert!(matches!(err, RagError::DocumentLoad { .. }));
    }

    #[test]
    fn html_is_stripped_to_structured_text() {
        let html = concat!(
            r#"<html><head><title>T</title><style>p{}</style></head>
            <body><h2 class="x">Power &amp; Thermals</h2>
            <p>The card draws <b>30W</b>&nbsp;at peak.</p>
            <script>alert(1)</script>"#,
            r#"<ul><li>One</li><li>Two &#8211; three</li></ul></body></html>"#,
        );
        let text = html_to_text(html);
        assert_eq!(
            text,
            "## Power & Thermals\n\nThe card draws 30W at peak.\n\nOne\n\nTwo \u{2013} three"
        );
        assert!(!text.contains("alert"));
    }

    #[test]
    fn guesses_mime_from_extension() {
        assert_eq!(DocumentLoader::guess_mime(Path::new("a.pdf")), MIME_PDF);
        assert_eq!(DocumentLoader::guess_mime(Path::new("a.html")), MIME_HTML);
        assert_eq!(DocumentLoader::guess_mime(Path::new("a.txt")), MIME_TEXT);
    }

    #[tokio::test]
    async fn load_path_checks_type_before_reading() {
        let err = DocumentLoader::new()
            .load_path("/definitely/missing/file.exe", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::UnsupportedDocumentType { .. }));
    }
}
