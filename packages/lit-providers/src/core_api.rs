use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde_json::Value;

use crate::{
	BoxFuture, Error, Result,
	connector::{self, SourceConnector, YearRange},
	http::{HttpFetcher, RetryPolicy, StatsSnapshot},
};
use lit_domain::{RawRecord, SourceTag};

/// CORE v3 open-access aggregator. Requires a bearer API key.
pub struct CoreConnector {
	fetcher: HttpFetcher,
	api_base: String,
	years: YearRange,
	max_results: u32,
}
impl CoreConnector {
	pub fn new(cfg: &lit_config::SourceConfig, retry: RetryPolicy) -> Result<Self> {
		let Some(api_key) = cfg.api_key.as_deref() else {
			return Err(Error::InvalidConfig {
				message: "sources.core.api_key is required.".to_string(),
			});
		};
		let mut headers = HeaderMap::new();

		headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

		Ok(Self {
			fetcher: HttpFetcher::new(SourceTag::Core, cfg, retry, headers)?,
			api_base: cfg.api_base.trim_end_matches('/').to_string(),
			years: YearRange::from_config(cfg),
			max_results: cfg.max_results,
		})
	}

	async fn search(&self, term: &str, limit: u32) -> Result<Vec<RawRecord>> {
		let term = connector::validate_term(term)?;

		self.search_works(search_expression(term, self.years), limit.min(self.max_results)).await
	}

	async fn search_works(&self, q: String, limit: u32) -> Result<Vec<RawRecord>> {
		let url = format!("{}/search/works", self.api_base);
		let params = [("q", q), ("limit", limit.to_string())];
		let json = self.fetcher.get_json(|client| client.get(&url).query(&params)).await?;
		let results =
			json.get("results").and_then(Value::as_array).ok_or_else(|| Error::InvalidResponse {
				message: "CORE response is missing results array.".to_string(),
			})?;

		Ok(results.iter().cloned().map(RawRecord::Core).collect())
	}

	async fn fetch_one(&self, id: &str) -> Result<Option<RawRecord>> {
		match connector::split_id(id) {
			(Some("core") | None, value) if !value.is_empty() => {
				let url = format!("{}/works/{value}", self.api_base);

				match self.fetcher.get_json(|client| client.get(&url)).await {
					Ok(json) => Ok(Some(RawRecord::Core(json))),
					Err(Error::Permanent { status: 404, .. }) => Ok(None),
					Err(err) => Err(err),
				}
			},
			(Some("doi"), value) if !value.is_empty() => {
				let q = format!("doi:\"{}\"", value.replace('"', ""));

				Ok(self.search_works(q, 1).await?.into_iter().next())
			},
			_ => Ok(None),
		}
	}
}

impl SourceConnector for CoreConnector {
	fn tag(&self) -> SourceTag {
		SourceTag::Core
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

fn search_expression(term: &str, years: YearRange) -> String {
	let mut q = format!("({term})");

	if let Some(from) = years.from {
		q.push_str(&format!(" AND yearPublished>={from}"));
	}
	if let Some(to) = years.to {
		q.push_str(&format!(" AND yearPublished<={to}"));
	}

	q
}
