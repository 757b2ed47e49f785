use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName};
use serde_json::Value;

use crate::{
	BoxFuture, Error, Result,
	connector::{self, SourceConnector, YearRange},
	http::{HttpFetcher, RetryPolicy, StatsSnapshot},
};
use lit_domain::{RawRecord, SourceTag};

const SEARCH_FIELDS: &str = "paperId,externalIds,title,abstract,authors,year,venue,journal,url,\
	citationCount,publicationTypes,openAccessPdf,fieldsOfStudy";
const PAPER_FIELDS: &str = "paperId,externalIds,title,abstract,authors,year,venue,journal,url,\
	citationCount,publicationTypes,openAccessPdf,fieldsOfStudy,references.paperId";
const MAX_LIMIT: u32 = 100;

/// Semantic Scholar Graph API. Paper lookups carry structured `references` objects.
pub struct SemanticScholarConnector {
	fetcher: HttpFetcher,
	api_base: String,
	years: YearRange,
	max_results: u32,
}
impl SemanticScholarConnector {
	pub fn new(cfg: &lit_config::SourceConfig, retry: RetryPolicy) -> Result<Self> {
		let mut headers = HeaderMap::new();

		if let Some(key) = cfg.api_key.as_deref() {
			headers.insert(HeaderName::from_static("x-api-key"), key.parse()?);
		}

		Ok(Self {
			fetcher: HttpFetcher::new(SourceTag::SemanticScholar, cfg, retry, headers)?,
			api_base: cfg.api_base.trim_end_matches('/').to_string(),
			years: YearRange::from_config(cfg),
			max_results: cfg.max_results,
		})
	}

	async fn search(&self, term: &str, limit: u32) -> Result<Vec<RawRecord>> {
		let term = connector::validate_term(term)?;
		let url = format!("{}/paper/search", self.api_base);
		let mut params = vec![
			("query", term.to_string()),
			("limit", limit.min(self.max_results).min(MAX_LIMIT).to_string()),
			("fields", SEARCH_FIELDS.to_string()),
		];

		if let Some(year) = self.year_param() {
			params.push(("year", year));
		}

		let json = self.fetcher.get_json(|client| client.get(&url).query(&params)).await?;

		Ok(data(&json)?.iter().cloned().map(RawRecord::SemanticScholar).collect())
	}

	async fn fetch_one(&self, id: &str) -> Result<Option<RawRecord>> {
		let Some(key) = paper_key(id) else { return Ok(None) };
		let url = format!("{}/paper/{key}", self.api_base);
		let params = [("fields", PAPER_FIELDS)];

		match self.fetcher.get_json(|client| client.get(&url).query(&params)).await {
			Ok(json) => Ok(Some(RawRecord::SemanticScholar(json))),
			Err(Error::Permanent { status: 404, .. }) => Ok(None),
			Err(err) => Err(err),
		}
	}

	async fn citing(&self, id: &str, limit: u32) -> Result<Vec<String>> {
		let Some(key) = paper_key(id) else { return Ok(Vec::new()) };
		let url = format!("{}/paper/{key}/citations", self.api_base);
		let params =
			[("fields", "paperId".to_string()), ("limit", limit.min(MAX_LIMIT).to_string())];
		let json = self.fetcher.get_json(|client| client.get(&url).query(&params)).await?;
		let own = connector::split_id(id).1;
		let citing = data(&json)?
			.iter()
			.filter_map(|edge| edge.pointer("/citingPaper/paperId").and_then(Value::as_str))
			.filter(|paper_id| *paper_id != own)
			.map(|paper_id| format!("s2:{paper_id}"))
			.collect();

		Ok(citing)
	}

	fn year_param(&self) -> Option<String> {
		match (self.years.from, self.years.to) {
			(None, None) => None,
			(Some(from), Some(to)) => Some(format!("{from}-{to}")),
			(Some(from), None) => Some(format!("{from}-")),
			(None, Some(to)) => Some(format!("-{to}")),
		}
	}
}

impl SourceConnector for SemanticScholarConnector {
	fn tag(&self) -> SourceTag {
		SourceTag::SemanticScholar
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

	fn citing_papers<'a>(&'a self, id: &'a str, limit: u32) -> BoxFuture<'a, Vec<String>> {
		Box::pin(async move {
			connector::settle(self.tag(), "citing_papers", self.citing(id, limit).await)
		})
	}

	fn stats(&self) -> StatsSnapshot {
		self.fetcher.stats()
	}

	fn min_interval(&self) -> Duration {
		self.fetcher.min_interval()
	}
}

/// Graph API paper key; external ids use the API's `DOI:`/`PMID:`/`ARXIV:` prefixes.
fn paper_key(id: &str) -> Option<String> {
	let key = match connector::split_id(id) {
		(Some("s2") | None, value) => value.to_string(),
		(Some("doi"), value) => format!("DOI:{value}"),
		(Some("pmid"), value) => format!("PMID:{value}"),
		(Some("arxiv"), value) => format!("ARXIV:{value}"),
		_ => return None,
	};

	(!key.ends_with(':') && !key.is_empty()).then_some(key)
}

fn data(json: &Value) -> Result<&Vec<Value>> {
	match json.get("data") {
		Some(Value::Array(items)) => Ok(items),
		// Searches without hits omit `data` entirely.
		None if json.get("total").is_some() => Ok(empty()),
		_ => Err(Error::InvalidResponse {
			message: "Semantic Scholar response is missing data array.".to_string(),
		}),
	}
}

fn empty() -> &'static Vec<Value> {
	static EMPTY: Vec<Value> = Vec::new();

	&EMPTY
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn paper_keys_use_graph_api_prefixes() {
		assert_eq!(paper_key("s2:abc").as_deref(), Some("abc"));
		assert_eq!(paper_key("doi:10.1/x").as_deref(), Some("DOI:10.1/x"));
		assert_eq!(paper_key("arxiv:2301.01234").as_deref(), Some("ARXIV:2301.01234"));
		assert_eq!(paper_key("core:99"), None);
		assert_eq!(paper_key("doi:"), None);
	}

	#[test]
	fn empty_search_has_no_data() {
		let json = serde_json::json!({ "total": 0, "offset": 0 });

		assert!(data(&json).expect("empty").is_empty());
	}
}
