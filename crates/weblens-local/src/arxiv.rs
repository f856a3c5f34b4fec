//! Minimal arXiv client (Atom feed) with bounded results.
//!
//! Notes:
//! - arXiv exposes an Atom API at `https://export.arxiv.org/api/query`.
//! - Parsing is deliberately minimal and resilient: a malformed feed yields the
//!   entries read before the error.
//! - Results are requested in relevance order and returned as-is.

use std::time::Duration;
use weblens_core::{Error, PaperRecord, Result};

use crate::send_with_retry;

pub const ARXIV_API_ENDPOINT: &str = "https://export.arxiv.org/api/query";

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn arxiv_id_from_url(url: &str) -> Option<String> {
    // Examples:
    // - https://arxiv.org/abs/0805.3415
    // - http://arxiv.org/abs/cs/9901001v1
    let u = url.trim();
    let i = u.rfind("/abs/")?;
    let tail = &u[i + "/abs/".len()..];
    let id = tail.trim_matches('/').trim();
    (!id.is_empty()).then_some(id.to_string())
}

pub fn arxiv_pdf_url(id: &str) -> String {
    format!("https://arxiv.org/pdf/{}.pdf", id.trim())
}

/// Free text becomes `all:` terms joined with AND; queries already using
/// field prefixes (`ti:`, `au:`, `cat:` ...) pass through untouched.
fn build_search_query(query: &str) -> String {
    let q = query.trim();
    if q.contains(':') {
        return q.to_string();
    }
    q.split_whitespace()
        .map(|w| format!("all:{}", w.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" AND ")
}

#[derive(Default)]
struct Entry {
    id_url: String,
    title: String,
    summary: String,
    published: Option<String>,
    authors: Vec<String>,
    primary_category: Option<String>,
    first_category: Option<String>,
    pdf_url: Option<String>,
    in_author: bool,
    text: String,
}

impl Entry {
    fn into_record(self) -> PaperRecord {
        let id = arxiv_id_from_url(&self.id_url);
        let pdf_url = self
            .pdf_url
            .or_else(|| id.as_deref().map(arxiv_pdf_url));
        PaperRecord {
            title: self.title,
            authors: self.authors,
            summary: self.summary,
            pdf_url,
            published: self.published,
            primary_category: self.primary_category.or(self.first_category),
        }
    }

    /// Attributes of `<category>`, `<arxiv:primary_category>` and `<link>` (start or empty tags).
    fn on_tag_attrs(&mut self, name: &str, e: &quick_xml::events::BytesStart<'_>) {
        let mut attrs = std::collections::BTreeMap::new();
        for a in e.attributes().flatten() {
            let k = String::from_utf8_lossy(a.key.as_ref()).to_string();
            let v = a.unescape_value().map(|v| v.to_string()).unwrap_or_default();
            attrs.insert(k, v);
        }
        let term = attrs.get("term").filter(|v| !v.trim().is_empty()).cloned();
        if name.ends_with("primary_category") {
            self.primary_category = term;
        } else if name.ends_with("category") {
            if self.first_category.is_none() {
                self.first_category = term;
            }
        } else if name.ends_with("link") {
            let is_pdf = attrs.get("title").map(String::as_str) == Some("pdf")
                || attrs.get("type").map(String::as_str) == Some("application/pdf");
            if is_pdf {
                self.pdf_url = attrs.get("href").cloned();
            }
        }
    }
}

/// Parse an arXiv Atom feed into records, in feed order.
pub fn parse_atom(body: &str) -> (Vec<PaperRecord>, bool) {
    let mut papers = Vec::new();
    let mut complete = true;

    // quick-xml because Atom namespaces make string matching brittle.
    let mut reader = quick_xml::Reader::from_str(body);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut cur: Option<Entry> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Eof) => break,
            Ok(quick_xml::events::Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name.ends_with("entry") {
                    cur = Some(Entry::default());
                } else if let Some(entry) = cur.as_mut() {
                    if name.ends_with("author") {
                        entry.in_author = true;
                    }
                    entry.on_tag_attrs(&name, &e);
                    entry.text.clear();
                }
            }
            Ok(quick_xml::events::Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if let Some(entry) = cur.as_mut() {
                    entry.on_tag_attrs(&name, &e);
                }
            }
            Ok(quick_xml::events::Event::Text(t)) => {
                if let Some(entry) = cur.as_mut() {
                    let txt = t.unescape().map(|t| t.to_string()).unwrap_or_default();
                    entry.text.push_str(&txt);
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name.ends_with("entry") {
                    if let Some(entry) = cur.take() {
                        papers.push(entry.into_record());
                    }
                } else if let Some(entry) = cur.as_mut() {
                    let txt = normalize_ws(&entry.text);
                    if name.ends_with("author") {
                        entry.in_author = false;
                    } else if entry.in_author && name.ends_with("name") {
                        if !txt.is_empty() {
                            entry.authors.push(txt);
                        }
                    } else if name.ends_with("id") {
                        entry.id_url = txt;
                    } else if name.ends_with("title") {
                        entry.title = txt;
                    } else if name.ends_with("summary") {
                        entry.summary = txt;
                    } else if name.ends_with("published") {
                        entry.published = (!txt.is_empty()).then_some(txt);
                    }
                    entry.text.clear();
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, parsed = papers.len(), "arxiv feed parse failed; keeping partial results");
                complete = false;
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    (papers, complete)
}

#[derive(Debug, Clone)]
pub struct ArxivClient {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl ArxivClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, ARXIV_API_ENDPOINT)
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Up to `max_results` papers in arXiv's relevance order, or the single
    /// "no results" sentinel.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<PaperRecord>> {
        let q = query.trim();
        if q.is_empty() {
            return Err(Error::InvalidInput("query must be non-empty".to_string()));
        }
        let max_results = max_results.clamp(1, 50);

        let mut url = reqwest::Url::parse(self.endpoint.trim())
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("search_query", &build_search_query(q))
            .append_pair("start", "0")
            .append_pair("max_results", &max_results.to_string())
            .append_pair("sortBy", "relevance")
            .append_pair("sortOrder", "descending");

        let resp = send_with_retry(self.client.get(url).timeout(self.timeout))
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("arxiv query failed: HTTP {status}")));
        }
        let body = resp.text().await.map_err(|e| Error::Search(e.to_string()))?;
        let (mut papers, _complete) = parse_atom(&body);
        papers.truncate(max_results);
        tracing::debug!(n = papers.len(), "arxiv search done");

        if papers.is_empty() {
            return Ok(vec![PaperRecord::no_results(q)]);
        }
        Ok(papers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::serve;
    use axum::{extract::Query, http::StatusCode, routing::get, Router};
    use std::collections::HashMap;

    const FEED: &str = r#"
<feed xmlns="http://www.w3.org/2005/Atom"
      xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/"
      xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title>ArXiv Query</title>
  <id>http://arxiv.org/api/feed-id</id>
  <opensearch:totalResults>2</opensearch:totalResults>
  <entry>
    <id>http://arxiv.org/abs/0805.3415v1</id>
    <updated>2008-05-22T00:00:00Z</updated>
    <published>2008-05-22T00:00:00Z</published>
    <title> On Upper-Confidence Bound Policies
      for Non-Stationary Bandit Problems </title>
    <summary>  Some abstract here.  </summary>
    <author><name>A. Author</name></author>
    <author><name>B. Author</name><arxiv:affiliation>Somewhere</arxiv:affiliation></author>
    <arxiv:primary_category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" />
    <category term="stat.ML" />
    <link href="http://arxiv.org/abs/0805.3415v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/0805.3415v1" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/1305.2545v2</id>
    <published>2013-05-11T00:00:00Z</published>
    <title>Bandits with Knapsacks</title>
    <summary>Abstract two.</summary>
    <author><name>C. Author</name></author>
    <category term="cs.DS" />
  </entry>
</feed>
"#;

    #[test]
    fn parse_atom_extracts_entries_in_feed_order() {
        let (papers, complete) = parse_atom(FEED);
        assert!(complete);
        assert_eq!(papers.len(), 2);

        let p = &papers[0];
        assert_eq!(
            p.title,
            "On Upper-Confidence Bound Policies for Non-Stationary Bandit Problems"
        );
        assert_eq!(p.authors, vec!["A. Author", "B. Author"]);
        assert_eq!(p.summary, "Some abstract here.");
        assert_eq!(p.pdf_url.as_deref(), Some("http://arxiv.org/pdf/0805.3415v1"));
        assert_eq!(p.published.as_deref(), Some("2008-05-22T00:00:00Z"));
        assert_eq!(p.primary_category.as_deref(), Some("cs.LG"));
    }

    #[test]
    fn pdf_url_and_category_fall_back_when_feed_omits_them() {
        let (papers, _) = parse_atom(FEED);
        let p = &papers[1];
        assert_eq!(p.pdf_url.as_deref(), Some("https://arxiv.org/pdf/1305.2545v2.pdf"));
        assert_eq!(p.primary_category.as_deref(), Some("cs.DS"));
        assert_eq!(p.authors, vec!["C. Author"]);
    }

    #[test]
    fn malformed_feed_keeps_entries_parsed_so_far() {
        let cut = FEED.find("<entry>\n    <id>http://arxiv.org/abs/1305").unwrap();
        let broken = format!("{}<entry><title>oops</summary>", &FEED[..cut]);
        let (papers, complete) = parse_atom(&broken);
        assert!(!complete);
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].authors.len(), 2);
    }

    #[test]
    fn build_search_query_ands_free_text_terms() {
        assert_eq!(build_search_query(" graph  neural "), "all:graph AND all:neural");
        assert_eq!(build_search_query("ti:transformer"), "ti:transformer");
    }

    #[tokio::test]
    async fn search_requests_relevance_order_and_caps_results() {
        let app = Router::new().route(
            "/api/query",
            get(|Query(p): Query<HashMap<String, String>>| async move {
                let ok = p.get("sortBy").map(String::as_str) == Some("relevance")
                    && p.get("max_results").map(String::as_str) == Some("1")
                    && p.get("search_query").map(String::as_str) == Some("all:bandits");
                if ok {
                    (StatusCode::OK, FEED.to_string())
                } else {
                    (StatusCode::BAD_REQUEST, String::new())
                }
            }),
        );
        let addr = serve(app).await;
        let c = ArxivClient::with_endpoint(crate::http_client().unwrap(), format!("http://{addr}/api/query"));
        let papers = c.search("bandits", 1).await.unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].authors, vec!["A. Author", "B. Author"]);
    }

    #[tokio::test]
    async fn empty_feed_yields_sentinel() {
        let app = Router::new().route(
            "/api/query",
            get(|| async { r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>none</title></feed>"# }),
        );
        let addr = serve(app).await;
        let c = ArxivClient::with_endpoint(crate::http_client().unwrap(), format!("http://{addr}/api/query"));
        let papers = c.search("nothing matches this", 5).await.unwrap();
        assert_eq!(papers.len(), 1);
        assert!(papers[0].is_no_results());
        assert!(papers[0].authors.is_empty());
    }

    #[tokio::test]
    async fn http_failure_is_search_error() {
        let app = Router::new().route("/api/query", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "x") }));
        let addr = serve(app).await;
        let c = ArxivClient::with_endpoint(crate::http_client().unwrap(), format!("http://{addr}/api/query"));
        let err = c.search("bandits", 5).await.unwrap_err();
        assert!(matches!(err, Error::Search(_)));
    }
}
