//! HTML article extraction.
//!
//! Picks the most article-like root element and collects paragraph text.
//! Pages without a usable title and body yield `None`; the caller drops them.

use scraper::{ElementRef, Html, Selector};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArticle {
    pub title: String,
    pub text: String,
}

struct Selectors {
    h1: Selector,
    title: Selector,
    article: Selector,
    main: Selector,
    body: Selector,
    paragraph: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            h1: Selector::parse("h1").expect("h1 selector"),
            title: Selector::parse("title").expect("title selector"),
            article: Selector::parse("article").expect("article selector"),
            main: Selector::parse("main").expect("main selector"),
            body: Selector::parse("body").expect("body selector"),
            paragraph: Selector::parse("p").expect("p selector"),
        }
    }

    fn pick_root<'a>(&self, document: &'a Html) -> ElementRef<'a> {
        document
            .select(&self.article)
            .next()
            .or_else(|| document.select(&self.main).next())
            .or_else(|| document.select(&self.body).next())
            .unwrap_or_else(|| document.root_element())
    }
}

pub fn extract_article(html: &str) -> Option<ExtractedArticle> {
    let selectors = Selectors::new();
    let document = Html::parse_document(html);

    let title = extract_title(&document, &selectors)?;
    let text = extract_body(&document, &selectors);
    if text.is_empty() {
        return None;
    }

    Some(ExtractedArticle { title, text })
}

fn extract_title(document: &Html, selectors: &Selectors) -> Option<String> {
    let heading = document
        .select(&selectors.h1)
        .next()
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty());

    heading
        .or_else(|| {
            document
                .select(&selectors.title)
                .next()
                .map(|el| element_text(&el))
        })
        .filter(|t| !t.is_empty())
}

fn extract_body(document: &Html, selectors: &Selectors) -> String {
    let root = selectors.pick_root(document);

    let paragraphs: Vec<String> = root
        .select(&selectors.paragraph)
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
        .collect();

    paragraphs.join("\n\n")
}

fn element_text(element: &ElementRef<'_>) -> String {
    let mut raw = String::new();
    for piece in element.text() {
        raw.push_str(piece);
    }
    collapse_whitespace(&raw)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
