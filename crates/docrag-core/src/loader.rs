//! Turns a directory of mixed-format files into [`Document`]s.
//!
//! Supported: `.txt`, `.md`, `.pdf`, `.docx`. A file that fails to parse is
//! logged and skipped; the rest of the directory still loads.

use regex::Regex;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{Document, Meta};

pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["pdf", "docx", "txt", "md"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Pdf,
    Docx,
    Text,
    Markdown,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Text),
            "md" => Some(Self::Markdown),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Text => "txt",
            Self::Markdown => "md",
        }
    }
}

#[derive(Debug, Default)]
pub struct Loader;

impl Loader {
    pub fn new() -> Self {
        Self
    }

    /// Load every supported file under `data_dir`, recursively and in path order.
    ///
    /// A missing directory yields an empty vector; the caller decides whether
    /// that is fatal.
    pub fn load_directory(&self, data_dir: &Path) -> Vec<Document> {
        if !data_dir.is_dir() {
            warn!(dir = %data_dir.display(), "data directory does not exist");
            return Vec::new();
        }
        let files = list_files(data_dir);
        info!(dir = %data_dir.display(), files = files.len(), "loading documents");
        let mut documents = Vec::new();
        let mut skipped = 0usize;
        for path in &files {
            let Some(format) = FileFormat::from_path(path) else {
                debug!(path = %path.display(), "unsupported extension, skipping");
                continue;
            };
            match self.load_file(path, format, data_dir) {
                Ok(docs) => documents.extend(docs),
                Err(e) => {
                    skipped += 1;
                    warn!(path = %path.display(), error = %e, "failed to load file, skipping");
                }
            }
        }
        info!(documents = documents.len(), skipped, "loading finished");
        documents
    }

    /// Parse one file. Returns zero documents when the extracted text is blank.
    pub fn load_file(&self, path: &Path, format: FileFormat, data_dir: &Path) -> Result<Vec<Document>> {
        let text = match format {
            FileFormat::Text | FileFormat::Markdown => read_text(path)?,
            FileFormat::Pdf => read_pdf(path)?,
            FileFormat::Docx => read_docx(path)?,
        };
        if text.trim().is_empty() {
            debug!(path = %path.display(), "no text extracted");
            return Ok(Vec::new());
        }
        let source_path = path.to_string_lossy().to_string();
        let mut metadata = Meta::new();
        metadata.insert("source".into(), source_path.clone());
        metadata.insert(
            "file_name".into(),
            path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
        );
        metadata.insert("format".into(), format.as_str().into());
        metadata.insert("category".into(), category_from_path(path, data_dir));
        Ok(vec![Document { text, metadata, source_path }])
    }
}

fn load_error(path: &Path, reason: impl std::fmt::Display) -> Error {
    Error::Load { path: path.to_path_buf(), reason: reason.to_string() }
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| load_error(path, e))?;
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => Ok(String::from_utf8_lossy(e.as_bytes()).to_string()),
    }
}

fn read_pdf(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| load_error(path, e))?;
    // the parser panics on some malformed inputs
    std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes))
        .map_err(|_| load_error(path, "PDF parser panicked"))?
        .map_err(|e| load_error(path, e))
}

fn read_docx(path: &Path) -> Result<String> {
    let file = fs::File::open(path).map_err(|e| load_error(path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| load_error(path, e))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| load_error(path, e))?
        .read_to_string(&mut xml)
        .map_err(|e| load_error(path, e))?;
    docx_xml_to_text(&xml).map_err(|e| load_error(path, e))
}

/// Flatten WordprocessingML body XML into plain text, one line per paragraph.
pub fn docx_xml_to_text(xml: &str) -> std::result::Result<String, regex::Error> {
    let breaks = Regex::new(r"<w:tab\s*/>|<w:br\s*/>|<w:cr\s*/>|</w:p>")?;
    let tags = Regex::new(r"<[^>]+>")?;

    let marked = breaks.replace_all(xml, |caps: &regex::Captures<'_>| {
        if caps[0].starts_with("<w:tab") { "\t" } else { "\n" }
    });
    let stripped = tags.replace_all(&marked, "");
    let text = stripped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    Ok(text.trim_end().to_string())
}

fn category_from_path(file_path: &Path, data_dir: &Path) -> String {
    let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path);
    match relative.parent().and_then(|p| p.to_str()) {
        Some(parent) if !parent.is_empty() => format!("/{}", parent.replace('\\', "/")),
        _ => "/".to_string(),
    }
}

fn list_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:tab/><w:t>world</w:t></w:r></w:p><w:p><w:r><w:t>R&amp;D &lt;team&gt;</w:t></w:r></w:p></w:body></w:document>"#;
        assert_eq!(docx_xml_to_text(xml).unwrap(), "Hello\tworld\nR&D <team>");
    }

    #[test]
    fn format_is_case_insensitive() {
        assert_eq!(FileFormat::from_path(Path::new("a/B.PDF")), Some(FileFormat::Pdf));
        assert_eq!(FileFormat::from_path(Path::new("notes.Md")), Some(FileFormat::Markdown));
        assert_eq!(FileFormat::from_path(Path::new("image.png")), None);
        assert_eq!(FileFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn category_is_relative_parent() {
        let root = Path::new("/data");
        assert_eq!(category_from_path(Path::new("/data/hr/policy.md"), root), "/hr");
        assert_eq!(category_from_path(Path::new("/data/top.txt"), root), "/");
    }
}
