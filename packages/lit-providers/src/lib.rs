pub mod arxiv;
pub mod connector;
pub mod core_api;
pub mod embedding;
pub mod error;
pub mod http;
pub mod openalex;
pub mod oracle;
pub mod pubmed;
pub mod semantic_scholar;

pub use connector::{SourceConnector, build_connectors, validate_term};
pub use error::{Error, Result};
pub use http::{ConnectorStats, HttpFetcher, Pacer, RetryPolicy, StatsSnapshot};
pub use lit_rpc::BoxFuture;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

pub fn auth_headers(
	api_key: Option<&str>,
	default_headers: &Map<String, Value>,
) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	if let Some(api_key) = api_key {
		headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);
	}

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}
