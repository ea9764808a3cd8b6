//! services/api/src/adapters/documents.rs
//!
//! Filesystem-backed `DocumentStore`. Lecture documents live under
//! `<MEDIA_ROOT>/lectures/<lecture id>/`, and are converted to HTML on read.
//! Word documents are unpacked with `zip` and their body XML is mapped to
//! headings, paragraphs, list items and bold/italic runs.

use async_trait::async_trait;
use lms_core::html::escape as html_escape;
use lms_core::ports::{DocumentStore, PortError, PortResult};
use regex::Regex;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;
use uuid::Uuid;
use zip::ZipArchive;

/// File extensions accepted for lecture documents.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["docx", "txt", "html", "htm"];

pub struct FsDocumentStore {
    media_root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
        }
    }

    /// Resolves a stored relative path, refusing anything that escapes the media root.
    fn resolve(&self, relative: &str) -> PortResult<PathBuf> {
        let path = Path::new(relative);
        let safe = path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(PortError::Invalid(format!("Invalid document path: {relative}")));
        }
        Ok(self.media_root.join(path))
    }
}

fn extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Keeps the last path component and replaces anything unusual with `_`.
fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn store(&self, lecture_id: Uuid, file_name: &str, data: &[u8]) -> PortResult<String> {
        let ext = extension(file_name).unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(PortError::Invalid(format!(
                "Unsupported document type '{}'. Upload a .docx, .txt or .html file.",
                file_name
            )));
        }
        let relative = format!("lectures/{}/{}", lecture_id, sanitize_file_name(file_name));
        let full = self.resolve(&relative)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Unexpected(format!("Failed to create media dir: {e}")))?;
        }
        tokio::fs::write(&full, data)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to write document: {e}")))?;
        debug!(path = %full.display(), bytes = data.len(), "document stored");
        Ok(relative)
    }

    async fn render_html(&self, path: &str) -> PortResult<String> {
        let full = self.resolve(path)?;
        let data = tokio::fs::read(&full).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PortError::NotFound(format!("Document {path} not found")),
            _ => PortError::Unexpected(format!("Failed to read document: {e}")),
        })?;
        match extension(path).as_deref() {
            Some("docx") => docx_to_html(&data),
            Some("html") | Some("htm") => Ok(String::from_utf8_lossy(&data).into_owned()),
            Some("txt") => Ok(text_to_html(&String::from_utf8_lossy(&data))),
            _ => Err(PortError::Invalid(format!("Unsupported document type: {path}"))),
        }
    }
}

//=========================================================================================
// Conversion
//=========================================================================================

/// Blank-line separated blocks become paragraphs; single newlines become `<br>`.
pub fn text_to_html(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| format!("<p>{}</p>", html_escape(block).replace('\n', "<br>")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compiled on first use and shared by every conversion.
static DOCX_PATTERNS: LazyLock<Result<DocxPatterns, regex::Error>> =
    LazyLock::new(DocxPatterns::compile);

struct DocxPatterns {
    paragraph: Regex,
    style: Regex,
    numbering: Regex,
    run: Regex,
    bold: Regex,
    italic: Regex,
    token: Regex,
}

impl DocxPatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            paragraph: Regex::new(r"(?s)<w:p\b[^>]*?(?:/>|>(.*?)</w:p>)")?,
            style: Regex::new(r#"<w:pStyle w:val="([^"]+)"\s*/>"#)?,
            numbering: Regex::new(r"<w:numPr>")?,
            run: Regex::new(r"(?s)<w:r\b[^>]*?(?:/>|>(.*?)</w:r>)")?,
            bold: Regex::new(r#"<w:b(?:\s+w:val="(?:true|1|on)")?\s*/>"#)?,
            italic: Regex::new(r#"<w:i(?:\s+w:val="(?:true|1|on)")?\s*/>"#)?,
            token: Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab\s*/>|<w:br\s*/>")?,
        })
    }

    fn shared() -> PortResult<&'static Self> {
        DOCX_PATTERNS
            .as_ref()
            .map_err(|e| PortError::Unexpected(format!("bad .docx pattern: {e}")))
    }
}

enum Block {
    Heading(u8, String),
    Paragraph(String),
    ListItem(String),
}

fn heading_level(style: &str) -> Option<u8> {
    let lower = style.to_ascii_lowercase();
    if lower == "title" {
        return Some(1);
    }
    let level: u8 = lower.strip_prefix("heading")?.trim().parse().ok()?;
    Some(level.clamp(1, 6))
}

/// Run text is already XML-escaped, which is also valid HTML.
fn render_runs(body: &str, p: &DocxPatterns) -> String {
    let mut html = String::new();
    for run in p.run.captures_iter(body) {
        let Some(run_body) = run.get(1).map(|m| m.as_str()) else {
            continue;
        };
        let mut text = String::new();
        for token in p.token.captures_iter(run_body) {
            match token.get(1) {
                Some(t) => text.push_str(t.as_str()),
                None if token[0].starts_with("<w:tab") => text.push(' '),
                None => text.push_str("<br>"),
            }
        }
        if text.is_empty() {
            continue;
        }
        let props = run_body.split("</w:rPr>").next().unwrap_or_default();
        let has_props = run_body.contains("</w:rPr>");
        if has_props && p.bold.is_match(props) {
            text = format!("<strong>{text}</strong>");
        }
        if has_props && p.italic.is_match(props) {
            text = format!("<em>{text}</em>");
        }
        html.push_str(&text);
    }
    html
}

fn docx_blocks(xml: &str, p: &DocxPatterns) -> Vec<Block> {
    let mut blocks = Vec::new();
    for paragraph in p.paragraph.captures_iter(xml) {
        let Some(body) = paragraph.get(1).map(|m| m.as_str()) else {
            continue;
        };
        let content = render_runs(body, p);
        if content.trim().is_empty() {
            continue;
        }
        let level = p
            .style
            .captures(body)
            .and_then(|c| heading_level(&c[1]));
        let block = match level {
            Some(level) => Block::Heading(level, content),
            None if p.numbering.is_match(body) => Block::ListItem(content),
            None => Block::Paragraph(content),
        };
        blocks.push(block);
    }
    blocks
}

/// Converts a `.docx` file to an HTML fragment.
pub fn docx_to_html(data: &[u8]) -> PortResult<String> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| PortError::Invalid(format!("Not a valid .docx file: {e}")))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| PortError::Invalid(format!("Not a valid .docx file: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| PortError::Invalid(format!("Unreadable .docx body: {e}")))?;

    let patterns = DocxPatterns::shared()?;
    let mut html = Vec::new();
    let mut in_list = false;
    for block in docx_blocks(&xml, patterns) {
        let is_item = matches!(block, Block::ListItem(_));
        if is_item && !in_list {
            html.push("<ul>".to_string());
        } else if !is_item && in_list {
            html.push("</ul>".to_string());
        }
        in_list = is_item;
        html.push(match block {
            Block::Heading(level, content) => format!("<h{level}>{content}</h{level}>"),
            Block::Paragraph(content) => format!("<p>{content}</p>"),
            Block::ListItem(content) => format!("<li>{content}</li>"),
        });
    }
    if in_list {
        html.push("</ul>".to_string());
    }
    Ok(html.join("\n"))
}
