use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// Calls an OpenAI-compatible `POST {api_base}{path}` embeddings endpoint.
pub async fn embed(cfg: &lit_config::Embedding, texts: &[String]) -> Result<Vec<Vec<f32>>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base.trim_end_matches('/'), cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(cfg.api_key.as_deref(), &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;
	let vectors = parse_embedding_response(&json)?;

	if vectors.len() != texts.len() {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding response returned {} vectors for {} inputs.",
				vectors.len(),
				texts.len()
			),
		});
	}

	Ok(vectors)
}

pub(crate) fn parse_embedding_response(json: &Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").ok_or_else(|| Error::InvalidResponse {
			message: "Embedding item missing embedding array.".to_string(),
		})?;

		indexed.push((index, parse_vector(embedding)?));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

pub(crate) fn parse_vector(value: &Value) -> Result<Vec<f32>> {
	let items = value.as_array().ok_or_else(|| Error::InvalidResponse {
		message: "Embedding must be an array of numbers.".to_string(),
	})?;
	let mut vec = Vec::with_capacity(items.len());

	for item in items {
		let number = item.as_f64().ok_or_else(|| Error::InvalidResponse {
			message: "Embedding value must be numeric.".to_string(),
		})?;

		vec.push(number as f32);
	}

	Ok(vec)
}
