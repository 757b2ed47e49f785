use std::time::Duration;

use quick_xml::{
	Reader,
	events::{BytesStart, Event},
};
use reqwest::header::HeaderMap;

use crate::{
	BoxFuture, Result,
	connector::{self, SourceConnector, YearRange},
	http::{HttpFetcher, RetryPolicy, StatsSnapshot},
};
use lit_domain::{ArxivEntry, RawRecord, SourceTag};

/// arXiv Atom export API.
pub struct ArxivConnector {
	fetcher: HttpFetcher,
	api_base: String,
	years: YearRange,
	max_results: u32,
}
impl ArxivConnector {
	pub fn new(cfg: &lit_config::SourceConfig, retry: RetryPolicy) -> Result<Self> {
		Ok(Self {
			fetcher: HttpFetcher::new(SourceTag::Arxiv, cfg, retry, HeaderMap::new())?,
			api_base: cfg.api_base.trim_end_matches('/').to_string(),
			years: YearRange::from_config(cfg),
			max_results: cfg.max_results,
		})
	}

	async fn search(&self, term: &str, limit: u32) -> Result<Vec<RawRecord>> {
		let term = connector::validate_term(term)?;
		let query = search_query(term, self.years);
		let params = [
			("search_query", query),
			("start", "0".to_string()),
			("max_results", limit.min(self.max_results).to_string()),
			("sortBy", "relevance".to_string()),
		];

		self.fetch_feed(&params).await
	}

	async fn fetch_one(&self, id: &str) -> Result<Option<RawRecord>> {
		let arxiv_id = match connector::split_id(id) {
			(Some("arxiv") | None, value) => lit_domain::normalize::arxiv_id(value),
			_ => None,
		};
		let Some(arxiv_id) = arxiv_id else { return Ok(None) };
		let params = [("id_list", arxiv_id), ("max_results", "1".to_string())];

		Ok(self.fetch_feed(&params).await?.into_iter().next())
	}

	async fn fetch_feed(&self, params: &[(&str, String)]) -> Result<Vec<RawRecord>> {
		let xml =
			self.fetcher.get_text(|client| client.get(&self.api_base).query(params)).await?;

		Ok(parse_feed(&xml)?.into_iter().map(RawRecord::Arxiv).collect())
	}
}

impl SourceConnector for ArxivConnector {
	fn tag(&self) -> SourceTag {
		SourceTag::Arxiv
	}

	fn query<'a>(&'a self, term: &'a str, limit: u32) -> BoxFuture<'a, Vec<RawRecord>> {
		Box::pin(async move {
			connector::settle(self.tag(), "query", self.search(term, limit).await)
		})
	}

	fn fetch_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Option<RawRecord>> {
		Box::pin(async move {
			connector::settle(self.tag(), "fetch_by_id", self.fetch_one(id).await)
		})
	}

	fn stats(&self) -> StatsSnapshot {
		self.fetcher.stats()
	}

	fn min_interval(&self) -> Duration {
		self.fetcher.min_interval()
	}
}

fn search_query(term: &str, years: YearRange) -> String {
	let phrase = term.replace('"', "");
	let mut query = format!("all:\"{phrase}\"");

	if !years.is_empty() {
		let from = years.from.unwrap_or(1991);
		let to = years.to.unwrap_or(9999);

		query.push_str(&format!(" AND submittedDate:[{from}01010000 TO {to}12312359]"));
	}

	query
}

/// Parses an Atom feed into entries. Error entries published by the API are skipped.
pub fn parse_feed(xml: &str) -> Result<Vec<ArxivEntry>> {
	let mut reader = Reader::from_str(xml);
	let mut buf = Vec::new();
	let mut stack: Vec<String> = Vec::new();
	let mut entries = Vec::new();
	let mut entry: Option<ArxivEntry> = None;
	let mut text = String::new();

	loop {
		match reader.read_event_into(&mut buf)? {
			Event::Start(e) => {
				let name = local_name(&e);

				if name == "entry" {
					entry = Some(ArxivEntry::default());
				}
				if let Some(current) = entry.as_mut() {
					read_attributes(current, &name, &e)?;
				}

				stack.push(name);
				text.clear();
			},
			Event::Empty(e) =>
				if let Some(current) = entry.as_mut() {
					read_attributes(current, &local_name(&e), &e)?;
				},
			Event::Text(t) => {
				let piece = t
					.unescape()
					.map(|cow| cow.into_owned())
					.unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());

				text.push_str(&piece);
			},
			Event::End(_) => {
				let Some(name) = stack.pop() else { continue };
				let parent = stack.last().map(String::as_str).unwrap_or_default();
				let value = collapse(&text);

				if name == "entry" {
					if let Some(done) = entry.take()
						&& !done.id.is_empty()
						&& !done.id.contains("/api/errors")
					{
						entries.push(done);
					}
				} else if let Some(current) = entry.as_mut() {
					match (parent, name.as_str()) {
						("entry", "id") => current.id = value,
						("entry", "title") => current.title = value,
						("entry", "summary") => current.summary = value,
						("entry", "published") => current.published = non_empty(value),
						("entry", "doi") => current.doi = non_empty(value),
						("entry", "journal_ref") => current.journal_ref = non_empty(value),
						("author", "name") => current.authors.extend(non_empty(value)),
						_ => {},
					}
				}

				text.clear();
			},
			Event::Eof => break,
			_ => {},
		}

		buf.clear();
	}

	Ok(entries)
}

fn read_attributes(entry: &mut ArxivEntry, name: &str, e: &BytesStart<'_>) -> Result<()> {
	match name {
		"link" => {
			let title = attribute(e, "title")?;
			let kind = attribute(e, "type")?;

			if title.as_deref() == Some("pdf") || kind.as_deref() == Some("application/pdf") {
				entry.pdf_url = attribute(e, "href")?;
			}
		},
		"category" =>
			if let Some(term) = attribute(e, "term")?
				&& !entry.categories.contains(&term)
			{
				entry.categories.push(term);
			},
		_ => {},
	}

	Ok(())
}

fn local_name(e: &BytesStart<'_>) -> String {
	String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
	let Some(attr) = e.try_get_attribute(key).map_err(quick_xml::Error::from)? else {
		return Ok(None);
	};

	Ok(Some(attr.unescape_value()?.into_owned()))
}

fn non_empty(value: String) -> Option<String> {
	(!value.is_empty()).then_some(value)
}

fn collapse(raw: &str) -> String {
	raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
