//! Page fetch + main-content extraction for `read_url`.
//!
//! Heuristics are deterministic and structural (no per-site rules): strip
//! script/style blocks, score candidate containers by non-link text density,
//! and fall back to a whole-page html2text rendering when no block clearly wins.

use std::io::Cursor;
use weblens_core::{Article, ExtractError, FetchBackend, FetchRequest, FetchResponse};

/// Convert HTML to readable plain text.
pub fn html_to_text(html: &str, width: usize) -> String {
    // html2text expects bytes; Cursor avoids allocating a second large buffer.
    html2text::from_read(Cursor::new(html.as_bytes()), width).unwrap_or_else(|_| html.to_string())
}

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn has_any_text(s: &str) -> bool {
    s.chars().any(|c| !c.is_whitespace())
}

/// Best-effort guess for whether bytes are HTML-ish.
pub fn bytes_look_like_html(bytes: &[u8]) -> bool {
    let mut i = 0usize;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return false;
    }
    let rest = &bytes[i..];
    rest.starts_with(b"<!doctype")
        || rest.starts_with(b"<!DOCTYPE")
        || rest.starts_with(b"<html")
        || rest.starts_with(b"<HTML")
        || rest.starts_with(b"<head")
        || rest.starts_with(b"<body")
}

fn content_type_lc_prefix(ct: Option<&str>) -> String {
    ct.unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

fn strip_tag_blocks(html: &str, tag: &str) -> String {
    // Only removes a block when a close tag is found; ASCII-case-insensitive on tag names.
    let tag_lc = tag.to_ascii_lowercase();
    let open_pat = format!("<{}", tag_lc);
    let close_pat = format!("</{}>", tag_lc);

    let mut out = String::new();
    let mut i = 0usize;
    let lower = html.to_ascii_lowercase();
    while let Some(rel_start) = lower[i..].find(&open_pat) {
        let start = i + rel_start;
        let after_open = start + open_pat.len();
        if let Some(rel_end) = lower[after_open..].find(&close_pat) {
            let end = after_open + rel_end + close_pat.len();
            out.push_str(&html[i..start]);
            i = end;
        } else {
            break;
        }
    }
    out.push_str(&html[i..]);
    out
}

fn class_or_id_lc(el: &html_scraper::ElementRef) -> String {
    let mut out = String::new();
    if let Some(c) = el.value().attr("class") {
        out.push_str(c);
        out.push(' ');
    }
    if let Some(i) = el.value().attr("id") {
        out.push_str(i);
    }
    out.to_ascii_lowercase()
}

fn is_generic_boilerplate_container(el: &html_scraper::ElementRef) -> bool {
    let tag = el.value().name();
    if matches!(tag, "nav" | "footer" | "aside" | "header") {
        return true;
    }
    let s = class_or_id_lc(el);
    if s.is_empty() {
        return false;
    }
    [
        "nav",
        "navbar",
        "menu",
        "sidebar",
        "footer",
        "header",
        "banner",
        "cookie",
        "consent",
        "ads",
        "advert",
        "promo",
        "subscribe",
        "newsletter",
        "comment",
        "related",
        "share",
    ]
    .iter()
    .any(|bad| s.contains(bad))
}

fn element_text_chars(el: &html_scraper::ElementRef) -> usize {
    el.text().map(|t| t.chars().count()).sum()
}

fn element_link_text_chars(el: &html_scraper::ElementRef) -> usize {
    let Ok(sel) = html_scraper::Selector::parse("a") else {
        return 0;
    };
    el.select(&sel)
        .map(|a| a.text().map(|t| t.chars().count()).sum::<usize>())
        .sum()
}

fn pick_main_text(doc: &html_scraper::Html, max_elems: usize) -> Option<String> {
    let max_elems = max_elems.clamp(50, 50_000);
    let sel = html_scraper::Selector::parse("article, main, section, div").ok()?;
    let mut seen = 0usize;
    let mut best_score: i64 = 0;
    let mut best_text: Option<String> = None;

    for el in doc.select(&sel) {
        seen += 1;
        if seen > max_elems {
            break;
        }
        if is_generic_boilerplate_container(&el) {
            continue;
        }
        let txt = element_text_chars(&el);
        if txt < 20 {
            continue;
        }
        let link_txt = element_link_text_chars(&el);
        // Link text is usually navigation, TOCs or tag clouds.
        let mut score = txt as i64 - 2 * (link_txt as i64);
        match el.value().name() {
            "article" => score += 500,
            "main" => score += 300,
            _ => {}
        }
        if link_txt > txt / 2 {
            score -= 500;
        }
        if score > best_score {
            best_score = score;
            let t = el.text().collect::<Vec<_>>().join(" ");
            best_text = Some(norm_ws(&t));
        }
    }

    best_text.filter(|t| has_any_text(t))
}

fn quality_score(s: &str) -> i64 {
    let non_ws = s.chars().filter(|c| !c.is_whitespace()).count() as i64;
    let url_hits = s.matches("http").count() as i64;
    let mut score = non_ws - 200 * url_hits;

    // Many short lines usually means menus.
    let short_lines = s
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .filter(|l| l.chars().count() <= 30)
        .count() as i64;
    score -= 20 * short_lines;

    let sl = s.to_ascii_lowercase();
    for needle in [
        "sign up", "log in", "login", "cookie", "consent", "privacy", "terms",
    ] {
        score -= 250 * sl.matches(needle).count() as i64;
    }
    score
}

fn first_text(doc: &html_scraper::Html, selector: &str) -> Option<String> {
    let sel = html_scraper::Selector::parse(selector).ok()?;
    let el = doc.select(&sel).next()?;
    let t = norm_ws(&el.text().collect::<Vec<_>>().join(" "));
    (!t.is_empty()).then_some(t)
}

fn first_attr(doc: &html_scraper::Html, selector: &str, attr: &str) -> Option<String> {
    let sel = html_scraper::Selector::parse(selector).ok()?;
    doc.select(&sel).find_map(|el| {
        let v = norm_ws(el.value().attr(attr)?);
        (!v.is_empty()).then_some(v)
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
}

fn page_metadata(doc: &html_scraper::Html) -> PageMetadata {
    let title = first_attr(doc, r#"meta[property="og:title"]"#, "content")
        .or_else(|| first_text(doc, "title"))
        .or_else(|| first_text(doc, "h1"));
    let author = first_attr(doc, r#"meta[name="author"]"#, "content")
        .or_else(|| first_attr(doc, r#"meta[property="article:author"]"#, "content"))
        .or_else(|| first_text(doc, r#"[rel="author"]"#));
    let date = first_attr(doc, r#"meta[property="article:published_time"]"#, "content")
        .or_else(|| first_attr(doc, r#"meta[name="date"]"#, "content"))
        .or_else(|| first_attr(doc, r#"meta[itemprop="datePublished"]"#, "content"))
        .or_else(|| first_attr(doc, "time[datetime]", "datetime"));
    PageMetadata {
        title,
        author,
        date,
    }
}

fn truncate_to_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte, _)) => s[..byte].to_string(),
        None => s.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub engine: &'static str,
    pub text: String,
    pub metadata: PageMetadata,
}

/// Best-effort readable text + metadata from a fetched body.
///
/// Returns `None` when the body has no usable text (binary, script-only, empty).
pub fn text_from_bytes(bytes: &[u8], content_type: Option<&str>, width: usize) -> Option<ExtractedText> {
    let ct0 = content_type_lc_prefix(content_type);
    let is_markdown = ct0 == "text/markdown" || ct0 == "text/x-markdown";
    let is_json = ct0 == "application/json" || ct0.ends_with("+json");
    let is_xml = ct0 == "application/xml" || ct0 == "text/xml" || ct0.ends_with("+xml");
    let is_html = ct0 == "text/html" || ct0 == "application/xhtml+xml" || bytes_look_like_html(bytes);
    let is_text = ct0.starts_with("text/") || is_markdown || is_json || is_xml;

    if !ct0.is_empty() && !is_text && !is_html {
        // image/*, application/pdf, application/octet-stream, ...
        return None;
    }

    if is_text && !is_html {
        let text = String::from_utf8_lossy(bytes).trim().to_string();
        let engine = if is_markdown {
            "markdown"
        } else if is_json {
            "json"
        } else if is_xml {
            "xml"
        } else {
            "text"
        };
        return has_any_text(&text).then(|| ExtractedText {
            engine,
            text,
            metadata: PageMetadata::default(),
        });
    }

    let html0 = String::from_utf8_lossy(bytes).to_string();
    let html1 = strip_tag_blocks(&html0, "script");
    let html2 = strip_tag_blocks(&html1, "style");
    let html = strip_tag_blocks(&html2, "noscript");

    let doc = html_scraper::Html::parse_document(&html);
    let metadata = page_metadata(&doc);
    let main = pick_main_text(&doc, 20_000);
    let full = html_to_text(&html, width);
    let full_ok = has_any_text(&full);

    if let Some(main) = main {
        let s_main = quality_score(&main);
        let s_full = if full_ok { quality_score(&full) } else { 0 };
        // Prefer the main block only when it is meaningfully better than the whole page.
        if !full_ok || s_main >= s_full + 300 {
            return Some(ExtractedText {
                engine: "html_main",
                text: main,
                metadata,
            });
        }
    }

    full_ok.then(|| ExtractedText {
        engine: "html2text",
        text: full.trim().to_string(),
        metadata,
    })
}

/// Build an [`Article`] from an already-fetched response.
pub fn article_from_response(
    url: &str,
    resp: &FetchResponse,
    width: usize,
    max_chars: usize,
) -> Result<Article, ExtractError> {
    if !resp.is_success() {
        return Err(ExtractError::FetchFailed(format!("HTTP {}", resp.status)));
    }
    let ex = text_from_bytes(&resp.bytes, resp.content_type.as_deref(), width)
        .ok_or(ExtractError::ExtractFailed)?;
    tracing::debug!(url, engine = ex.engine, chars = ex.text.chars().count(), "extracted");
    Ok(Article {
        url: url.to_string(),
        title: ex.metadata.title,
        author: ex.metadata.author,
        date: ex.metadata.date,
        text: truncate_to_chars(&ex.text, max_chars),
    })
}

pub fn is_secure_url(url: &str) -> bool {
    url::Url::parse(url.trim())
        .map(|u| u.scheme() == "https")
        .unwrap_or_else(|_| url.trim().to_ascii_lowercase().starts_with("https://"))
}

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub timeout_ms: u64,
    pub max_bytes: u64,
    /// Wrap width for html2text rendering.
    pub width: usize,
    /// Cap on returned body text.
    pub max_chars: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 20_000,
            max_bytes: 5_000_000,
            width: 100,
            max_chars: 20_000,
        }
    }
}

/// Fetch + extract, with structured failure reasons.
#[derive(Debug, Clone)]
pub struct Extractor<F> {
    fetcher: F,
    cfg: ExtractConfig,
}

impl<F: FetchBackend> Extractor<F> {
    pub fn new(fetcher: F, cfg: ExtractConfig) -> Self {
        Self { fetcher, cfg }
    }

    pub async fn extract(&self, url: &str) -> Result<Article, ExtractError> {
        let url = url.trim();
        if !is_secure_url(url) {
            return Err(ExtractError::UnsupportedScheme);
        }
        let req = FetchRequest {
            url: url.to_string(),
            timeout_ms: Some(self.cfg.timeout_ms),
            max_bytes: Some(self.cfg.max_bytes),
        };
        let resp = self.fetcher.fetch(&req).await.map_err(|e| {
            tracing::warn!(url, error = %e, "page fetch failed");
            ExtractError::FetchFailed(e.to_string())
        })?;
        article_from_response(url, &resp, self.cfg.width, self.cfg.max_chars)
    }
}
