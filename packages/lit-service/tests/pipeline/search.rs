use std::{sync::Arc, time::Duration};

use lit_domain::{Provenance, ResearchPlan, SourceTag};
use lit_providers::SourceConnector;
use lit_service::Error;

use super::{
	FakeSource, KeywordEmbedding, openalex_work, query, scenario_scores, scenario_sources, service,
	test_config,
};

#[tokio::test]
async fn round_zero_dedupes_and_keeps_the_top_quantile() {
	let embedding = Arc::new(KeywordEmbedding::new(&scenario_scores()));
	let service = service(test_config(), scenario_sources(), embedding);
	let report = service
		.search(query(&["ai ethics", "healthcare bias"], 0))
		.await
		.expect("Search failed.");

	assert_eq!(report.fetched, 6);
	assert_eq!(report.unique, 5);
	assert_eq!(report.duplicates, 1);
	assert_eq!(report.per_source.get("openalex"), Some(&3));
	assert_eq!(report.per_source.get("semantic_scholar"), Some(&3));
	assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
	assert_eq!(report.rounds.len(), 1);

	let round = &report.rounds[0];

	assert_eq!(round.phase, "searching");
	assert_eq!(round.unique, 5);
	// Linear interpolation: position 0.8 * 4 = 3.2 between 0.8 and 0.9.
	assert!((round.cutoff - 0.82).abs() < 1e-4, "cutoff was {}", round.cutoff);
	assert_eq!(report.records.len(), 1);
	assert_eq!(report.records[0].record.external_id, "openalex:W1");
	assert_eq!(report.records[0].provenance, Provenance::None);
	assert!((report.records[0].score - 0.9).abs() < 1e-4);
	assert!(report.finished_at >= report.started_at);
}

#[tokio::test]
async fn oracle_outage_keeps_every_search_result() {
	let embedding = Arc::new(KeywordEmbedding::new(&scenario_scores()).failing_after(0));
	let service = service(test_config(), scenario_sources(), embedding);
	let report = service
		.search(query(&["ai ethics", "healthcare bias"], 2))
		.await
		.expect("Search failed.");

	assert_eq!(report.records.len(), 5);
	assert!(report.records.iter().all(|document| document.score == 0.5));
	assert_eq!(report.rounds[0].cutoff, 0.0);
}

#[tokio::test]
async fn slow_and_empty_sources_are_reported_without_failing_the_run() {
	let mut cfg = test_config();

	cfg.retry.call_timeout_ms = 50;

	let openalex = FakeSource::new(SourceTag::OpenAlex).on_term("ai ethics", vec![
		openalex_work("W1", "Alpha", &[]),
		openalex_work("W2", "Bravo", &[]),
	]);
	let pubmed = FakeSource::new(SourceTag::PubMed).slow(Duration::from_millis(500));
	let semantic_scholar = FakeSource::new(SourceTag::SemanticScholar);
	let sources = vec![
		Arc::new(pubmed) as Arc<dyn SourceConnector>,
		Arc::new(openalex),
		Arc::new(semantic_scholar),
	];
	let embedding = Arc::new(KeywordEmbedding::new(&scenario_scores()));
	let service = service(cfg, sources, embedding);
	let report = service.search(query(&["ai ethics"], 0)).await.expect("Search failed.");

	assert_eq!(report.records.len(), 1);
	assert_eq!(report.records[0].record.title, "Alpha");
	assert!(report.errors.iter().any(|error| error.contains("pubmed timed out")));
	assert!(report.errors.contains(&"Source semantic_scholar returned no records.".to_string()));
	assert!(!report.errors.iter().any(|error| error.contains("pubmed returned no records")));
	assert_eq!(report.per_source.get("pubmed"), Some(&0));
}

#[tokio::test]
async fn source_timing_out_on_every_term_reports_only_timeouts() {
	let mut cfg = test_config();

	cfg.retry.call_timeout_ms = 50;

	let pubmed = FakeSource::new(SourceTag::PubMed).slow(Duration::from_millis(500));
	let openalex = FakeSource::new(SourceTag::OpenAlex)
		.on_term("ai ethics", vec![openalex_work("W1", "Alpha", &[])]);
	let sources = vec![Arc::new(pubmed) as Arc<dyn SourceConnector>, Arc::new(openalex)];
	let embedding = Arc::new(KeywordEmbedding::new(&scenario_scores()));
	let service = service(cfg, sources, embedding);
	let report = service
		.search(query(&["ai ethics", "healthcare bias"], 0))
		.await
		.expect("Search failed.");

	assert_eq!(report.errors, vec![
		"Source pubmed timed out for term \"ai ethics\".".to_string(),
		"Source pubmed timed out for term \"healthcare bias\".".to_string(),
	]);
	assert_eq!(report.records.len(), 1);
}

#[tokio::test]
async fn legacy_or_terms_are_split_before_searching() {
	let openalex = Arc::new(FakeSource::new(SourceTag::OpenAlex));
	let sources = vec![openalex.clone() as Arc<dyn SourceConnector>];
	let embedding = Arc::new(KeywordEmbedding::new(&[]));
	let service = service(test_config(), sources, embedding);
	let report = service
		.search(query(&["(\"ai ethics\" OR \"clinical bias\")", "AI Ethics"], 0))
		.await
		.expect("Search failed.");

	assert_eq!(openalex.queries.load(std::sync::atomic::Ordering::SeqCst), 2);
	assert!(report.records.is_empty());
	assert_eq!(report.rounds.len(), 1);
	assert_eq!(report.rounds[0].kept, 0);
}

#[tokio::test]
async fn invalid_queries_are_rejected() {
	let embedding = Arc::new(KeywordEmbedding::new(&[]));
	let service = service(test_config(), scenario_sources(), embedding);
	let mut blank_plan = query(&["ai ethics"], 0);

	blank_plan.plan = ResearchPlan::Text("   ".to_string());

	assert!(matches!(service.search(blank_plan).await, Err(Error::InvalidRequest { .. })));
	assert!(matches!(
		service.search(query(&["  ", "()"], 0)).await,
		Err(Error::InvalidRequest { .. })
	));

	let mut unknown_source = query(&["ai ethics"], 0);

	unknown_source.sources = vec![SourceTag::Core];

	assert!(matches!(service.search(unknown_source).await, Err(Error::InvalidRequest { .. })));
}
