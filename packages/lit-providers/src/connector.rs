use std::{sync::Arc, time::Duration};

use crate::{
	BoxFuture, Error, Result,
	arxiv::ArxivConnector,
	core_api::CoreConnector,
	http::{RetryPolicy, StatsSnapshot},
	openalex::OpenAlexConnector,
	pubmed::PubMedConnector,
	semantic_scholar::SemanticScholarConnector,
};
use lit_domain::{RawRecord, SourceTag};

/// One external literature database.
///
/// Connector operations never fail: transport and parse errors are logged and surface
/// as an empty result.
pub trait SourceConnector: Send + Sync {
	fn tag(&self) -> SourceTag;

	fn query<'a>(&'a self, term: &'a str, limit: u32) -> BoxFuture<'a, Vec<RawRecord>>;

	/// Resolves a canonical `prefix:id` (or bare native id) to one record.
	fn fetch_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Option<RawRecord>>;

	/// Canonical ids of papers citing `id`. Sources without a citation index return none.
	fn citing_papers<'a>(&'a self, id: &'a str, limit: u32) -> BoxFuture<'a, Vec<String>> {
		let _ = (id, limit);

		Box::pin(async { Vec::new() })
	}

	fn stats(&self) -> StatsSnapshot;

	/// Minimum spacing this connector keeps between requests.
	fn min_interval(&self) -> Duration {
		Duration::ZERO
	}
}

pub fn validate_term(term: &str) -> Result<&str> {
	let trimmed = term.trim();

	if trimmed.is_empty() {
		return Err(Error::InvalidTerm);
	}

	Ok(trimmed)
}

/// Splits `prefix:value` into its parts. Ids without a known prefix are returned whole.
pub fn split_id(id: &str) -> (Option<&str>, &str) {
	let trimmed = id.trim();

	match trimmed.split_once(':') {
		Some((prefix, value))
			if matches!(prefix, "doi" | "pmid" | "arxiv" | "core" | "openalex" | "s2") =>
			(Some(prefix), value),
		_ => (None, trimmed),
	}
}

pub(crate) fn settle<T>(source: SourceTag, operation: &str, result: Result<T>) -> T
where
	T: Default,
{
	match result {
		Ok(value) => value,
		Err(Error::InvalidTerm) => {
			tracing::warn!(source = %source, operation, "Rejected empty search term.");

			T::default()
		},
		Err(err) => {
			tracing::warn!(error = %err, source = %source, operation, "Source call failed.");

			T::default()
		},
	}
}

/// Builds every enabled connector, in a fixed source order.
pub fn build_connectors(cfg: &lit_config::Config) -> Result<Vec<Arc<dyn SourceConnector>>> {
	let retry = RetryPolicy::from_config(&cfg.retry);
	let sources = &cfg.sources;
	let mut out: Vec<Arc<dyn SourceConnector>> = Vec::new();

	if sources.pubmed.enabled {
		out.push(Arc::new(PubMedConnector::new(&sources.pubmed, retry)?));
	}
	if sources.arxiv.enabled {
		out.push(Arc::new(ArxivConnector::new(&sources.arxiv, retry)?));
	}
	if sources.openalex.enabled {
		out.push(Arc::new(OpenAlexConnector::new(&sources.openalex, retry)?));
	}
	if sources.core.enabled {
		match sources.core.api_key.as_deref() {
			Some(_) => out.push(Arc::new(CoreConnector::new(&sources.core, retry)?)),
			None => tracing::warn!(source = "core", "Source disabled because api_key is missing."),
		}
	}
	if sources.semantic_scholar.enabled {
		out.push(Arc::new(SemanticScholarConnector::new(&sources.semantic_scholar, retry)?));
	}

	Ok(out)
}

/// Year range filter shared by connectors that support one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YearRange {
	pub from: Option<i32>,
	pub to: Option<i32>,
}
impl YearRange {
	pub fn from_config(cfg: &lit_config::SourceConfig) -> Self {
		Self { from: cfg.year_from, to: cfg.year_to }
	}

	pub fn is_empty(&self) -> bool {
		self.from.is_none() && self.to.is_none()
	}
}
