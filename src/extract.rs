//! HTML to plain-text extraction.
//!
//! Only the `<body>` subtree is considered. `<script>` and `<style>` subtrees
//! are dropped wholesale; every remaining text node becomes its own line so
//! block boundaries stay visible to line-based tooling downstream.

use scraper::{ElementRef, Html};

/// Elements whose content is code or styling, never prose
const SKIPPED_ELEMENTS: &[&str] = &["script", "style"];

/// Strips markup from archived HTML payloads
#[derive(Clone, Debug)]
pub struct DocumentExtractor {
    min_line_chars: usize,
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new(50)
    }
}

impl DocumentExtractor {
    /// Create an extractor whose line filter drops lines shorter than `min_line_chars`
    pub fn new(min_line_chars: usize) -> Self {
        Self { min_line_chars }
    }

    /// Body text of `html`, one text node per line
    ///
    /// Returns `None` when the document has no `<body>` element (for example a
    /// frameset page). That is "nothing to extract", not an error.
    ///
    /// ```
    /// use warc_harvest::DocumentExtractor;
    ///
    /// let extractor = DocumentExtractor::default();
    /// let text = extractor
    ///     .extract_text("<html><body><style>p{}</style><p>Hi</p></body></html>")
    ///     .unwrap();
    /// assert_eq!(text.trim(), "Hi");
    /// ```
    pub fn extract_text(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let body = document
            .root_element()
            .children()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "body")?;

        let mut nodes = Vec::new();
        collect_text(body, &mut nodes);
        Some(nodes.join("\n"))
    }

    /// Keep only lines with at least `min_line_chars` characters
    ///
    /// Lines are trimmed before measuring. Survivors are joined with `'\n'` and
    /// the result ends with a newline unless it is empty.
    pub fn filter_lines(&self, text: &str) -> String {
        let mut out = String::new();
        for line in text.lines().map(str::trim) {
            if line.chars().count() >= self.min_line_chars {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    /// [`extract_text`](Self::extract_text) followed by [`filter_lines`](Self::filter_lines)
    pub fn extract_document(&self, html: &str) -> Option<String> {
        self.extract_text(html).map(|text| self.filter_lines(&text))
    }
}

fn collect_text(element: ElementRef<'_>, out: &mut Vec<String>) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push(String::from(&**text));
        } else if let Some(el) = ElementRef::wrap(child) {
            if SKIPPED_ELEMENTS.contains(&el.value().name()) {
                continue;
            }
            collect_text(el, out);
        }
    }
}
