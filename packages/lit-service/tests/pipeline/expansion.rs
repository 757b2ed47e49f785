use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{Json, Router, extract::Path, routing};
use serde_json::{Value, json};

use lit_domain::{
	AbstractSection, ExpansionCandidate, ExternalIds, NormalizedRecord, Provenance, PubMedArticle,
	PubMedReference, RawRecord, ScoredDocument, SourceTag, normalize_one,
};
use lit_providers::{RetryPolicy, SourceConnector, openalex::OpenAlexConnector};
use lit_service::{SourceSet, expansion};
use lit_testkit::StubServer;

use super::{FakeSource, KeywordEmbedding, PLAN, openalex_work, query, service, test_config};

/// Seed W1 references itself, W2 and W3; W1 is cited by itself, W3 and W4.
fn graph_source() -> FakeSource {
	FakeSource::new(SourceTag::OpenAlex)
		.on_term("ai ethics", vec![openalex_work("W1", "Alpha", &["W1", "W2", "W3"])])
		.cited_by("openalex:W1", &["openalex:W1", "openalex:W3", "openalex:W4"])
		.on_id("openalex:W2", openalex_work("W2", "Bravo", &[]))
		.on_id("openalex:W3", openalex_work("W3", "Charlie", &[]))
		.on_id("openalex:W4", openalex_work("W4", "Delta", &[]))
}

fn only(source: FakeSource) -> Vec<Arc<dyn SourceConnector>> {
	vec![Arc::new(source) as Arc<dyn SourceConnector>]
}

fn flat_scores() -> Vec<(&'static str, f32)> {
	vec![("Alpha", 0.9), ("Bravo", 0.5), ("Charlie", 0.5), ("Delta", 0.5)]
}

fn scored(raw: RawRecord) -> ScoredDocument {
	let record = normalize_one(&raw, time::OffsetDateTime::now_utc()).expect("record");

	ScoredDocument::new(record, 0.9)
}

#[test]
fn references_never_include_the_document_itself() {
	let seed = scored(openalex_work("W1", "Alpha", &["W1", "W2", "W2"]));
	let s2 = scored(RawRecord::SemanticScholar(json!({
		"paperId": "p1",
		"title": "Graphs",
		"abstract": "About graphs.",
		"references": [{ "paperId": "p1" }, { "paperId": "p9" }, { "paperId": null }]
	})));

	assert_eq!(expansion::extract_references(&[seed, s2]), vec!["openalex:W2", "s2:p9"]);
}

#[test]
fn pubmed_reference_lists_yield_pmid_then_doi_ids() {
	let reference = |pmid: Option<&str>, doi: Option<&str>, pmc: Option<&str>| PubMedReference {
		pmid: pmid.map(str::to_string),
		doi: doi.map(str::to_string),
		pmc: pmc.map(str::to_string),
	};
	let article = scored(RawRecord::PubMed(PubMedArticle {
		pmid: "100".to_string(),
		title: "Triage ethics".to_string(),
		abstract_sections: vec![AbstractSection { label: None, text: "Text.".to_string() }],
		references: vec![
			reference(Some("200"), Some("10.1/two"), None),
			reference(None, Some("https://doi.org/10.1/Three"), None),
			reference(None, None, Some("PMC4")),
			reference(Some("100"), None, None),
		],
		..PubMedArticle::default()
	}));

	assert_eq!(expansion::extract_references(&[article]), vec!["pmid:200", "doi:10.1/three"]);
}

#[tokio::test]
async fn citing_lookups_exclude_self_and_fall_back_to_doi() {
	let openalex = FakeSource::new(SourceTag::OpenAlex)
		.cited_by("openalex:W1", &["openalex:W1", "openalex:W5"])
		.cited_by("doi:10.1/pubmed", &["openalex:W6", "openalex:W7", "openalex:W8"]);
	let sources = SourceSet::new(vec![Arc::new(openalex) as Arc<dyn SourceConnector>]);
	let mut cfg = test_config();

	cfg.expansion.limit_per_paper = 2;

	let expander = expansion::Expander::new(&sources, &cfg);
	let seed = scored(openalex_work("W1", "Alpha", &[]));
	let pubmed = ScoredDocument::new(
		NormalizedRecord {
			source: SourceTag::PubMed,
			external_id: "pmid:42".to_string(),
			ids: ExternalIds {
				pmid: Some("42".to_string()),
				doi: Some("10.1/pubmed".to_string()),
				..ExternalIds::default()
			},
			..seed.record.clone()
		},
		0.8,
	);
	let citing = expander.extract_citing_papers(&[seed, pubmed]).await;

	assert_eq!(citing.found, vec!["openalex:W5", "openalex:W6", "openalex:W7"]);
	assert!(citing.timed_out.is_empty());
}

async fn work_by_key(Path(key): Path<String>) -> Json<Value> {
	Json(json!({
		"id": format!("https://openalex.org/{key}"),
		"title": format!("Work {key}"),
	}))
}

#[tokio::test]
async fn paced_source_resolves_every_candidate_within_the_call_timeout() {
	let app = Router::new().route("/openalex/works/{key}", routing::get(work_by_key));
	let server = StubServer::start(app).await.expect("server");
	let mut cfg = lit_testkit::stub_config(server.base_url()).expect("config");

	cfg.sources.openalex.min_interval_ms = 100;
	cfg.retry.call_timeout_ms = 250;

	let connector =
		OpenAlexConnector::new(&cfg.sources.openalex, RetryPolicy::from_config(&cfg.retry))
			.expect("connector");
	let sources = SourceSet::new(vec![Arc::new(connector) as Arc<dyn SourceConnector>]);
	let expander = expansion::Expander::new(&sources, &cfg);
	let candidates: Vec<ExpansionCandidate> = (1..=8)
		.map(|n| ExpansionCandidate {
			id: format!("openalex:W{n}"),
			provenance: Provenance::Citation,
		})
		.collect();
	let fetched = expander.fetch(&candidates).await;
	let ids: Vec<&str> = fetched
		.found
		.iter()
		.filter_map(|item| match &item.raw {
			RawRecord::OpenAlex(work) => work.get("id").and_then(Value::as_str),
			_ => None,
		})
		.collect();

	assert!(fetched.timed_out.is_empty(), "timed out: {:?}", fetched.timed_out);
	assert_eq!(ids.len(), 8);
	assert_eq!(ids[0], "https://openalex.org/W1");
	assert_eq!(ids[7], "https://openalex.org/W8");
}

#[tokio::test]
async fn timed_out_candidate_fetches_are_reported() {
	let mut cfg = test_config();

	cfg.retry.call_timeout_ms = 50;

	let source = graph_source().slow_fetches(Duration::from_millis(500));
	let embedding = Arc::new(KeywordEmbedding::new(&flat_scores()));
	let service = service(cfg, only(source), embedding);
	let report = service.search(query(&["ai ethics"], 1)).await.expect("Search failed.");

	assert_eq!(report.errors, vec!["Candidate fetches timed out: 3.".to_string()]);
	assert_eq!(report.records.len(), 1);
	assert_eq!(report.records[0].record.external_id, "openalex:W1");
}

#[tokio::test]
async fn fetch_and_score_skips_unresolved_and_abstractless_candidates() {
	let source = graph_source().on_id(
		"openalex:W5",
		RawRecord::OpenAlex(json!({ "id": "https://openalex.org/W5", "title": "No abstract" })),
	);
	let embedding = Arc::new(KeywordEmbedding::new(&[("Bravo", 0.9), ("Charlie", 0.2)]));
	let service = service(test_config(), only(source), embedding);
	let expander = expansion::Expander::new(&service.sources, &service.cfg);
	let candidates: Vec<ExpansionCandidate> = [
		("openalex:W3", Provenance::Both),
		("openalex:W2", Provenance::Reference),
		("openalex:W5", Provenance::Citation),
		("openalex:W404", Provenance::Citation),
	]
	.into_iter()
	.map(|(id, provenance)| ExpansionCandidate { id: id.to_string(), provenance })
	.collect();
	let (kept, cutoff) = expander
		.fetch_and_score(&candidates, &service.scorer(), PLAN, service.cfg.scoring.quantile, 25)
		.await;

	assert_eq!(expander.citation_source(), SourceTag::OpenAlex);
	assert!((cutoff - 0.76).abs() < 1e-4, "cutoff was {cutoff}");
	assert_eq!(kept.len(), 1);
	assert_eq!(kept[0].record.external_id, "openalex:W2");
	assert_eq!(kept[0].provenance, Provenance::Reference);
}

#[tokio::test]
async fn expansion_round_tags_candidates_by_provenance() {
	let embedding = Arc::new(KeywordEmbedding::new(&flat_scores()));
	let service = service(test_config(), only(graph_source()), embedding);
	let report = service.search(query(&["ai ethics"], 1)).await.expect("Search failed.");

	assert_eq!(report.rounds.len(), 2);
	assert_eq!(report.rounds[1].phase, "expanding");
	assert_eq!(report.rounds[1].fetched, 3);
	assert_eq!(report.fetched, 4);
	assert_eq!(report.per_source.get("openalex"), Some(&4));

	let provenance: HashMap<&str, Provenance> = report
		.records
		.iter()
		.map(|document| (document.record.external_id.as_str(), document.provenance))
		.collect();

	assert_eq!(provenance.len(), 4);
	assert_eq!(provenance["openalex:W1"], Provenance::None);
	assert_eq!(provenance["openalex:W2"], Provenance::Reference);
	assert_eq!(provenance["openalex:W3"], Provenance::Both);
	assert_eq!(provenance["openalex:W4"], Provenance::Citation);
}

#[tokio::test]
async fn expansion_scoring_failure_keeps_a_bounded_prefix() {
	let mut cfg = test_config();

	cfg.scoring.fallback_prefix = 2;

	// The first oracle call scores round 0; every later call fails.
	let embedding = Arc::new(KeywordEmbedding::new(&flat_scores()).failing_after(1));
	let service = service(cfg, only(graph_source()), embedding);
	let report = service.search(query(&["ai ethics"], 1)).await.expect("Search failed.");
	let expanded: Vec<&ScoredDocument> =
		report.records.iter().filter(|document| document.provenance != Provenance::None).collect();

	assert_eq!(report.rounds[1].kept, 2);
	assert_eq!(report.rounds[1].cutoff, 0.0);
	assert_eq!(expanded.len(), 2);
	assert_eq!(expanded[0].record.external_id, "openalex:W3");
	assert!(expanded.iter().all(|document| document.score == 0.5));
}

#[tokio::test]
async fn empty_expansion_round_keeps_earlier_results() {
	let source = FakeSource::new(SourceTag::OpenAlex)
		.on_term("ai ethics", vec![openalex_work("W1", "Alpha", &["W404"])]);
	let embedding = Arc::new(KeywordEmbedding::new(&flat_scores()));
	let service = service(test_config(), only(source), embedding);
	let report = service.search(query(&["ai ethics"], 2)).await.expect("Search failed.");

	assert_eq!(report.rounds.len(), 2);
	assert_eq!(report.rounds[1].kept, 0);
	assert_eq!(report.records.len(), 1);
	assert_eq!(report.records[0].record.external_id, "openalex:W1");
}
