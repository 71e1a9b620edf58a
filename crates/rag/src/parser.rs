//! Document parsing: per-page lines with optional font metadata are folded
//! into titled sections for the chunker.

/// One extracted line. `font_size` is present when the source format carries
/// layout metadata (PDF extraction), absent for plain text.
#[derive(Clone, Debug, PartialEq)]
pub struct RawLine {
    pub text: String,
    pub font_size: Option<f32>,
}

impl RawLine {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), font_size: None }
    }

    pub fn sized(text: impl Into<String>, font_size: f32) -> Self {
        Self { text: text.into(), font_size: Some(font_size) }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawPage {
    pub lines: Vec<RawLine>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedSection {
    pub title: String,
    pub content: String,
    pub page: i64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedDocument {
    pub sections: Vec<ParsedSection>,
    pub page_count: i64,
}

impl ParsedDocument {
    /// Full text of the document, sections joined in order.
    pub fn full_text(&self) -> String {
        self.sections
            .iter()
            .map(|section| section.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

const HEADING_FONT_PT: f32 = 14.0;
const HEADING_MAX_CHARS: usize = 200;
const PLAIN_HEADING_MAX_CHARS: usize = 80;

fn is_heading(line: &RawLine) -> bool {
    let text = line.text.trim();
    if text.is_empty() {
        return false;
    }

    match line.font_size {
        // Headings in laid-out documents are large and short.
        Some(size) => size >= HEADING_FONT_PT && text.chars().count() < HEADING_MAX_CHARS,
        // Without layout metadata, a short line with no terminal punctuation
        // reads as a heading.
        None => {
            text.chars().count() < PLAIN_HEADING_MAX_CHARS
                && !text.ends_with(['.', '!', '?', ':', ';', ','])
        }
    }
}

/// Fold pages into sections. Each detected heading starts a new section; text
/// before the first heading lands in an "Introduction" section.
pub fn parse_document(pages: &[RawPage]) -> ParsedDocument {
    let mut sections = Vec::new();
    let mut title = "Introduction".to_string();
    let mut content: Vec<String> = Vec::new();
    let mut section_page: i64 = 1;

    for (page_index, page) in pages.iter().enumerate() {
        let page_number = page_index as i64 + 1;
        for line in &page.lines {
            let text = line.text.trim();
            if text.is_empty() {
                continue;
            }

            if is_heading(line) {
                if !content.is_empty() {
                    sections.push(ParsedSection {
                        title: std::mem::take(&mut title),
                        content: content.join("\n"),
                        page: section_page,
                    });
                    content.clear();
                }
                title = text.to_string();
                section_page = page_number;
            } else {
                content.push(text.to_string());
            }
        }
    }

    if !content.is_empty() {
        sections.push(ParsedSection { title, content: content.join("\n"), page: section_page });
    }

    ParsedDocument { sections, page_count: pages.len() as i64 }
}

/// Plain-text front-end: pages split on form-feed, one RawLine per line,
/// no font metadata.
pub fn pages_from_text(text: &str) -> Vec<RawPage> {
    text.split('\u{0c}')
        .map(|page| RawPage {
            lines: page.lines().map(RawLine::plain).collect(),
        })
        .collect()
}
