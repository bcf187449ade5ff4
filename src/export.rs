/// Document-to-markdown conversion with on-disk persistence.
///
/// [`MarkdownExport`] wraps any [`DocumentConverter`] and saves every
/// converted document as `<output_dir>/<stem>.md` before handing the content
/// back unchanged. Compose it at the call site wherever conversions happen.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

/// Converts a source document into markdown text.
pub trait DocumentConverter {
    fn convert(&self, path: &Path) -> Result<String>;
}

/// Passes UTF-8 text and markdown files through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextConverter;

impl DocumentConverter for TextConverter {
    fn convert(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
    }
}

/// Extracts the text layer of a PDF, one `## Page N` section per page.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfConverter;

impl DocumentConverter for PdfConverter {
    fn convert(&self, path: &Path) -> Result<String> {
        let doc = lopdf::Document::load(path)
            .with_context(|| format!("failed to load PDF {}", path.display()))?;

        let mut markdown = String::new();
        for page_num in doc.get_pages().keys() {
            let text = doc
                .extract_text(&[*page_num])
                .with_context(|| format!("failed to extract page {page_num}"))?;
            if !markdown.is_empty() {
                markdown.push('\n');
            }
            markdown.push_str(&format!("## Page {page_num}\n\n{}\n", text.trim()));
        }
        Ok(markdown)
    }
}

/// Picks a converter from the file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConverter;

impl DocumentConverter for AutoConverter {
    fn convert(&self, path: &Path) -> Result<String> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => PdfConverter.convert(path),
            "md" | "markdown" | "txt" => TextConverter.convert(path),
            other => bail!("unsupported document type: .{other}"),
        }
    }
}

/// Decorator persisting every conversion result to `output_dir`.
pub struct MarkdownExport<C> {
    inner: C,
    output_dir: PathBuf,
}

impl<C: DocumentConverter> MarkdownExport<C> {
    pub fn new(inner: C, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            output_dir: output_dir.into(),
        }
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where the markdown for `source` ends up.
    #[must_use]
    pub fn markdown_path(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        self.output_dir.join(format!("{stem}.md"))
    }

    /// Write `markdown` for `source`, returning the saved path.
    pub fn save(&self, source: &Path, markdown: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("failed to create markdown dir {}", self.output_dir.display())
        })?;

        let output_path = self.markdown_path(source);
        fs::write(&output_path, markdown)
            .with_context(|| format!("failed to write {}", output_path.display()))?;

        info!("Markdown saved: {}", output_path.display());
        Ok(output_path)
    }
}

impl<C: DocumentConverter> DocumentConverter for MarkdownExport<C> {
    fn convert(&self, path: &Path) -> Result<String> {
        let markdown = self.inner.convert(path)?;
        self.save(path, &markdown)?;
        Ok(markdown)
    }
}
