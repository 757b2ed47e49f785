use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::{
	BoxFuture, Error, Result,
	connector::{self, SourceConnector, YearRange},
	http::{HttpFetcher, RetryPolicy, StatsSnapshot},
};
use lit_domain::{RawRecord, SourceTag, normalize::url_suffix};

const MAX_PER_PAGE: u32 = 200;

/// OpenAlex works API. Also serves as a citation index through the `cites:` filter.
pub struct OpenAlexConnector {
	fetcher: HttpFetcher,
	api_base: String,
	mailto: Option<String>,
	years: YearRange,
	max_results: u32,
}
impl OpenAlexConnector {
	pub fn new(cfg: &lit_config::SourceConfig, retry: RetryPolicy) -> Result<Self> {
		Ok(Self {
			fetcher: HttpFetcher::new(SourceTag::OpenAlex, cfg, retry, HeaderMap::new())?,
			api_base: cfg.api_base.trim_end_matches('/').to_string(),
			mailto: cfg.contact_email.clone(),
			years: YearRange::from_config(cfg),
			max_results: cfg.max_results,
		})
	}

	async fn search(&self, term: &str, limit: u32) -> Result<Vec<RawRecord>> {
		let term = connector::validate_term(term)?;
		let mut params = self.common_params();

		params.push(("search", term.to_string()));
		params.push(("per-page", limit.min(self.max_results).min(MAX_PER_PAGE).to_string()));

		if let Some(filter) = self.year_filter() {
			params.push(("filter", filter));
		}

		let json = self.list_works(&params).await?;

		Ok(results(&json)?.iter().cloned().map(RawRecord::OpenAlex).collect())
	}

	async fn fetch_one(&self, id: &str) -> Result<Option<RawRecord>> {
		let Some(key) = work_key(id) else { return Ok(None) };
		let url = format!("{}/works/{key}", self.api_base);
		let params = self.common_params();

		match self.fetcher.get_json(|client| client.get(&url).query(&params)).await {
			Ok(json) => Ok(Some(RawRecord::OpenAlex(json))),
			Err(Error::Permanent { status: 404, .. }) => Ok(None),
			Err(err) => Err(err),
		}
	}

	async fn citing(&self, id: &str, limit: u32) -> Result<Vec<String>> {
		let work_id = match connector::split_id(id) {
			(Some("openalex") | None, value) => url_suffix(value),
			_ => match self.fetch_one(id).await? {
				Some(RawRecord::OpenAlex(work)) =>
					work.get("id").and_then(Value::as_str).and_then(url_suffix),
				_ => None,
			},
		};
		let Some(work_id) = work_id else { return Ok(Vec::new()) };
		let mut params = self.common_params();

		params.push(("filter", format!("cites:{work_id}")));
		params.push(("per-page", limit.min(MAX_PER_PAGE).to_string()));
		params.push(("select", "id".to_string()));

		let json = self.list_works(&params).await?;
		let citing = results(&json)?
			.iter()
			.filter_map(|work| work.get("id").and_then(Value::as_str).and_then(url_suffix))
			.filter(|citing_id| citing_id != &work_id)
			.map(|citing_id| format!("openalex:{citing_id}"))
			.collect();

		Ok(citing)
	}

	async fn list_works(&self, params: &[(&str, String)]) -> Result<Value> {
		let url = format!("{}/works", self.api_base);

		self.fetcher.get_json(|client| client.get(&url).query(params)).await
	}

	fn common_params(&self) -> Vec<(&'static str, String)> {
		self.mailto.iter().map(|mailto| ("mailto", mailto.clone())).collect()
	}

	fn year_filter(&self) -> Option<String> {
		let mut parts = Vec::new();

		if let Some(from) = self.years.from {
			parts.push(format!("from_publication_date:{from}-01-01"));
		}
		if let Some(to) = self.years.to {
			parts.push(format!("to_publication_date:{to}-12-31"));
		}

		(!parts.is_empty()).then(|| parts.join(","))
	}
}

impl SourceConnector for OpenAlexConnector {
	fn tag(&self) -> SourceTag {
		SourceTag::OpenAlex
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

/// Path key for `/works/{key}`: a bare `W…` id, or an external id OpenAlex resolves.
fn work_key(id: &str) -> Option<String> {
	match connector::split_id(id) {
		(Some("openalex") | None, value) => url_suffix(value),
		(Some("doi"), value) if !value.is_empty() => Some(format!("doi:{value}")),
		(Some("pmid"), value) if !value.is_empty() => Some(format!("pmid:{value}")),
		_ => None,
	}
}

fn results(json: &Value) -> Result<&Vec<Value>> {
	json.get("results").and_then(Value::as_array).ok_or_else(|| Error::InvalidResponse {
		message: "OpenAlex response is missing results array.".to_string(),
	})
}
