use std::sync::{
	Arc, Mutex,
	atomic::{AtomicUsize, Ordering},
};

use lit_rpc::{ClientOptions, InboundFrame, RpcClient};
use lit_service::{LiteratureService, Providers, RecordSink, RpcRecordSink};
use lit_testkit::LoopbackDialer;

use super::{KeywordEmbedding, query, scenario_scores, scenario_sources, test_config};

#[tokio::test]
async fn storage_failures_are_reported_per_record() {
	let writes = Arc::new(AtomicUsize::new(0));
	let stored = Arc::new(Mutex::new(Vec::new()));
	let dialer = {
		let writes = writes.clone();
		let stored = stored.clone();

		LoopbackDialer::new(move |envelope| {
			let data = &envelope.data;

			writes.fetch_add(1, Ordering::SeqCst);

			assert_eq!(data.action, "create_literature_record");
			assert_eq!(data.payload["review_id"], "review-1");
			assert_eq!(data.payload["plan_id"], "plan-1");

			if data.payload["record"]["title"] == "Delta" {
				return Some(InboundFrame::failed(&data.correlation_id, "disk full"));
			}

			stored.lock().expect("lock").push(data.payload["record"]["external_id"].clone());

			Some(InboundFrame::completed(&data.correlation_id, serde_json::json!({ "ok": true })))
		})
	};
	let mut cfg = test_config();

	cfg.storage.enabled = true;

	let client = Arc::new(RpcClient::new(Arc::new(dialer), ClientOptions::from_config(&cfg.rpc)));
	let sink: Arc<dyn RecordSink> = Arc::new(RpcRecordSink::new(client, &cfg.storage));
	// Every oracle call fails, so every record is kept with the fallback score.
	let embedding = Arc::new(KeywordEmbedding::new(&scenario_scores()).failing_after(0));
	let service = LiteratureService::with_providers(
		cfg,
		scenario_sources(),
		Providers::new(embedding, Some(sink)),
	);
	let report = service
		.search(query(&["ai ethics", "healthcare bias"], 0))
		.await
		.expect("Search failed.");

	assert_eq!(report.records.len(), 5);
	assert_eq!(writes.load(Ordering::SeqCst), 5);
	assert_eq!(stored.lock().expect("lock").len(), 4);
	assert_eq!(report.errors.len(), 1);
	assert!(report.errors[0].contains("s2:p2"), "errors: {:?}", report.errors);
	assert!(report.errors[0].contains("disk full"), "errors: {:?}", report.errors);
}

#[tokio::test]
async fn disabled_storage_writes_nothing() {
	let dialer = Arc::new(LoopbackDialer::new(|_| None));
	let cfg = test_config();
	let client = Arc::new(RpcClient::new(dialer.clone(), ClientOptions::from_config(&cfg.rpc)));
	let sink: Arc<dyn RecordSink> = Arc::new(RpcRecordSink::new(client, &cfg.storage));
	let embedding = Arc::new(KeywordEmbedding::new(&scenario_scores()));
	let service = LiteratureService::with_providers(
		cfg,
		scenario_sources(),
		Providers::new(embedding, Some(sink)),
	);
	let report = service.search(query(&["ai ethics"], 0)).await.expect("Search failed.");

	assert!(report.errors.iter().all(|error| !error.contains("Storage")));
	assert_eq!(dialer.dials(), 0);
}
