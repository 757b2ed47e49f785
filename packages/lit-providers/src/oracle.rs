use std::time::Duration;

use serde_json::Value;

use crate::{Error, Result, embedding};
use lit_rpc::RpcClient;

/// Embeds `texts` through the scoring oracle reached over the shared RPC channel.
///
/// Payload: `{ "operation": "embed", "model", "dimensions", "texts" }`. The reply carries
/// `embeddings` (one array per text) or an OpenAI-shaped `data` array.
pub async fn embed(
	client: &RpcClient,
	cfg: &lit_config::Embedding,
	context_id: &str,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	let payload = serde_json::json!({
		"operation": "embed",
		"model": cfg.model,
		"dimensions": cfg.dimensions,
		"texts": texts,
	});
	let request = client.request(context_id, &cfg.rpc_action, payload);
	let result = client.call(request, Duration::from_millis(cfg.timeout_ms)).await?;
	let vectors = parse_oracle_response(&result)?;

	if vectors.len() != texts.len() {
		return Err(Error::InvalidResponse {
			message: format!(
				"Oracle returned {} embeddings for {} inputs.",
				vectors.len(),
				texts.len()
			),
		});
	}

	Ok(vectors)
}

fn parse_oracle_response(result: &Value) -> Result<Vec<Vec<f32>>> {
	if let Some(items) = result.get("embeddings").and_then(Value::as_array) {
		return items.iter().map(embedding::parse_vector).collect();
	}
	if result.get("data").is_some() {
		return embedding::parse_embedding_response(result);
	}

	Err(Error::InvalidResponse {
		message: "Oracle response carries neither embeddings nor data.".to_string(),
	})
}
