use crate::error::IngestError;
use lopdf::Document;
use regex::Regex;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// A heading-delimited span of document text, used by the coarse fallback
/// when per-page windowing produces nothing.
#[derive(Debug, Clone)]
pub struct Section {
    pub title: String,
    pub body: String,
}

pub trait PdfExtractor {
    /// Extracts per-page text. Unreadable or empty pages are skipped, not
    /// fatal; an empty result means the caller should try the section
    /// fallback.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;

    /// Coarser whole-document extraction backing the section fallback.
    fn extract_full_text(&self, path: &Path) -> Result<String, IngestError> {
        let pages = self.extract_pages(path)?;
        Ok(pages
            .into_iter()
            .map(|page| page.text)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    tracing::debug!(page = page_no, %error, "skipping unreadable page");
                    continue;
                }
            };

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        Ok(pages)
    }

    fn extract_full_text(&self, path: &Path) -> Result<String, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;
        let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();

        document
            .extract_text(&page_numbers)
            .map_err(|error| IngestError::PdfParse(error.to_string()))
    }
}

/// Splits full-document text into heading-delimited sections. Headings are
/// numbered lines ("3.1 Evaluation") or the usual paper section names.
/// Text before the first heading becomes a section titled by its first
/// plausible line.
pub fn detect_sections(text: &str) -> Result<Vec<Section>, IngestError> {
    let numbered = Regex::new(r"^\d+(?:\.\d+)*\.?\s+\S.{0,79}$")?;
    let named = Regex::new(
        r"(?i)^(abstract|introduction|related work|background|methodology|methods?|approach|experiments?|evaluation|results|discussion|conclusions?|references|acknowledg(?:e)?ments|appendix(?:\s+[a-z])?)\s*$",
    )?;

    let mut sections = Vec::new();
    let mut title: Option<String> = None;
    let mut body = String::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if numbered.is_match(trimmed) || named.is_match(trimmed) {
            flush_section(&mut sections, title.take(), &mut body);
            title = Some(trimmed.to_string());
        } else {
            body.push_str(line);
            body.push('\n');
        }
    }
    flush_section(&mut sections, title, &mut body);

    Ok(sections)
}

fn flush_section(sections: &mut Vec<Section>, title: Option<String>, body: &mut String) {
    let text = std::mem::take(body);
    let trimmed = text.trim();

    match title {
        Some(title) => sections.push(Section {
            title,
            body: trimmed.to_string(),
        }),
        None => {
            if !trimmed.is_empty() {
                sections.push(Section {
                    title: leading_title(trimmed),
                    body: trimmed.to_string(),
                });
            }
        }
    }
}

/// First line with at least three alphabetic characters, capped at 120
/// characters; used to title untitled leading text.
fn leading_title(text: &str) -> String {
    for line in text.lines() {
        let trimmed = line.trim();
        let alphabetic = trimmed.chars().filter(|ch| ch.is_alphabetic()).count();
        if alphabetic >= 3 {
            return trimmed.chars().take(120).collect();
        }
    }
    "Document".to_string()
}
