use std::{collections::HashMap, sync::Arc};

use axum::{Json, Router, extract::State, routing};
use serde_json::{Value, json};

use lit_rpc::{ClientOptions, InboundFrame, RpcClient};
use lit_service::{EmbeddingProvider, HttpEmbedding, RpcEmbedding};
use lit_testkit::{LoopbackDialer, StubServer};

use super::{query, scenario_scores, scenario_sources, service, test_config, vector_for};

fn score_table() -> HashMap<String, f32> {
	scenario_scores().into_iter().map(|(title, score)| (title.to_string(), score)).collect()
}

#[tokio::test]
async fn rpc_oracle_scores_documents_over_the_channel() {
	let scores = score_table();
	let dialer = Arc::new(LoopbackDialer::new(move |envelope| {
		let data = &envelope.data;

		if data.action != "ai_chat_completion" || data.payload["operation"] != "embed" {
			return Some(InboundFrame::failed(&data.correlation_id, "unexpected action"));
		}

		let embeddings: Vec<Vec<f32>> = data.payload["texts"]
			.as_array()
			.map(|texts| {
				texts
					.iter()
					.filter_map(Value::as_str)
					.map(|text| vector_for(&scores, text))
					.collect()
			})
			.unwrap_or_default();

		Some(InboundFrame::completed(&data.correlation_id, json!({ "embeddings": embeddings })))
	}));
	let mut cfg = test_config();

	cfg.embedding.mode = lit_config::EmbeddingMode::Rpc;

	let client = Arc::new(RpcClient::new(dialer.clone(), ClientOptions::from_config(&cfg.rpc)));
	let embedding: Arc<dyn EmbeddingProvider> = Arc::new(RpcEmbedding::new(client, "review-1"));
	let service = service(cfg, scenario_sources(), embedding);
	let report = service
		.search(query(&["ai ethics", "healthcare bias"], 0))
		.await
		.expect("Search failed.");

	assert!((report.rounds[0].cutoff - 0.82).abs() < 1e-4);
	assert_eq!(report.records.len(), 1);
	assert_eq!(report.records[0].record.title, "Alpha");
	assert_eq!(dialer.dials(), 1);
}

async fn embeddings(
	State(scores): State<Arc<HashMap<String, f32>>>,
	Json(body): Json<Value>,
) -> Json<Value> {
	let data: Vec<Value> = body["input"]
		.as_array()
		.map(|texts| {
			texts
				.iter()
				.filter_map(Value::as_str)
				.enumerate()
				.map(|(index, text)| {
					json!({ "index": index, "embedding": vector_for(&scores, text) })
				})
				.collect()
		})
		.unwrap_or_default();

	Json(json!({ "data": data }))
}

#[tokio::test]
async fn http_oracle_ranks_terms_against_the_plan() {
	let app = Router::new()
		.route("/embed/embeddings", routing::post(embeddings))
		.with_state(Arc::new(score_table()));
	let server = StubServer::start(app).await.expect("Failed to start stub server.");
	let cfg = lit_testkit::stub_config(server.base_url()).expect("config");
	let scorer = lit_service::Scorer::new(Arc::new(HttpEmbedding), cfg.embedding.clone());
	let phrases: Vec<String> =
		["Echo", "Alpha", "Unrelated", "Charlie OR Bravo"].iter().map(|p| p.to_string()).collect();
	let ranked = scorer.rank_phrases(super::PLAN, &phrases, 3).await;
	let names: Vec<&str> = ranked.iter().map(|(phrase, _)| phrase.as_str()).collect();

	assert_eq!(names, vec!["Unrelated", "Alpha", "Bravo"]);
	assert!((ranked[1].1 - 0.9).abs() < 1e-4);
	assert_eq!(scorer.embed("   ").await, vec![0.0; 4]);
	assert!((scorer.embed("Alpha").await[0] - 0.9).abs() < 1e-4);
}
