use serde_json::json;
use time::OffsetDateTime;

use lit_domain::{
	AbstractSection, ArxivEntry, Deduplicator, NormalizedRecord, PubMedArticle, RawRecord,
	SourceTag, dedupe, normalize, normalize_one, quantile,
};

fn openalex_work(id: &str, title: &str, abstract_words: &[&str]) -> RawRecord {
	let index: serde_json::Map<String, serde_json::Value> = abstract_words
		.iter()
		.enumerate()
		.map(|(position, word)| (word.to_string(), json!([position])))
		.collect();

	RawRecord::OpenAlex(json!({
		"id": format!("https://openalex.org/{id}"),
		"doi": "https://doi.org/10.1000/XYZ",
		"title": title,
		"publication_year": 2021,
		"cited_by_count": 12,
		"type": "article",
		"authorships": [{ "author": { "display_name": "Ada Lovelace" } }],
		"primary_location": {
			"landing_page_url": "https://example.org/landing",
			"source": { "display_name": "Journal of Tests" }
		},
		"abstract_inverted_index": index,
		"referenced_works": ["https://openalex.org/W2"]
	}))
}

fn pubmed_article(pmid: &str, title: &str, abstract_text: &str) -> RawRecord {
	RawRecord::PubMed(PubMedArticle {
		pmid: pmid.to_string(),
		title: title.to_string(),
		abstract_sections: vec![AbstractSection { label: None, text: abstract_text.to_string() }],
		authors: vec!["Grace Hopper".to_string()],
		year: Some(2020),
		journal: Some("BMJ".to_string()),
		doi: None,
		pmc: Some("PMC123".to_string()),
		mesh_terms: vec!["Ethics".to_string()],
		publication_types: vec!["Journal Article".to_string()],
		references: Vec::new(),
	})
}

fn record(title: &str, source: SourceTag) -> NormalizedRecord {
	let raw = match source {
		SourceTag::PubMed => pubmed_article("1", title, "Some abstract."),
		_ => openalex_work("W1", title, &["Some", "abstract."]),
	};

	normalize_one(&raw, OffsetDateTime::now_utc()).expect("record must normalize")
}

#[test]
fn normalize_never_returns_empty_abstracts() {
	let raw = vec![
		openalex_work("W1", "Kept", &["Fairness", "matters."]),
		openalex_work("W2", "Dropped", &[]),
		RawRecord::OpenAlex(json!({ "id": "https://openalex.org/W3", "title": "No abstract" })),
		RawRecord::OpenAlex(json!({ "id": "https://openalex.org/W4", "abstract": "   " })),
	];
	let records = normalize(&raw, SourceTag::OpenAlex);

	assert_eq!(records.len(), 1);
	assert!(records.iter().all(|record| !record.abstract_text.is_empty()));
	assert_eq!(records[0].abstract_text, "Fairness matters.");
}

#[test]
fn normalize_skips_records_from_other_sources() {
	let raw = vec![
		pubmed_article("42", "PubMed paper", "Abstract."),
		openalex_work("W1", "OpenAlex paper", &["Abstract."]),
	];
	let records = normalize(&raw, SourceTag::PubMed);

	assert_eq!(records.len(), 1);
	assert_eq!(records[0].external_id, "pmid:42");
}

#[test]
fn openalex_record_fields_are_mapped() {
	let raw = openalex_work("W77", "Title", &["An", "abstract."]);
	let record = normalize_one(&raw, OffsetDateTime::now_utc()).expect("normalized");

	assert_eq!(record.external_id, "openalex:W77");
	assert_eq!(record.ids.doi.as_deref(), Some("10.1000/xyz"));
	assert_eq!(record.authors, vec!["Ada Lovelace"]);
	assert_eq!(record.year, Some(2021));
	assert_eq!(record.journal.as_deref(), Some("Journal of Tests"));
	assert_eq!(record.citation_count, Some(12));
	assert_eq!(record.url.as_deref(), Some("https://doi.org/10.1000/xyz"));
	assert_eq!(record.raw["source"], "openalex");
}

#[test]
fn pubmed_prefers_pmc_pdf_and_labels_sections() {
	let raw = RawRecord::PubMed(PubMedArticle {
		pmid: "99".to_string(),
		title: "Structured".to_string(),
		abstract_sections: vec![
			AbstractSection { label: Some("BACKGROUND".to_string()), text: "Why.".to_string() },
			AbstractSection { label: Some("RESULTS".to_string()), text: "What.".to_string() },
		],
		pmc: Some("PMC9".to_string()),
		..PubMedArticle::default()
	});
	let record = normalize_one(&raw, OffsetDateTime::now_utc()).expect("normalized");

	assert_eq!(record.abstract_text, "BACKGROUND: Why. RESULTS: What.");
	assert_eq!(
		record.url.as_deref(),
		Some("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC9/pdf/")
	);
}

#[test]
fn arxiv_ids_lose_their_version_suffix() {
	let raw = RawRecord::Arxiv(ArxivEntry {
		id: "http://arxiv.org/abs/2301.01234v2".to_string(),
		title: "  Attention \n is   all ".to_string(),
		summary: "We   propose.".to_string(),
		published: Some("2023-01-04T00:00:00Z".to_string()),
		..ArxivEntry::default()
	});
	let record = normalize_one(&raw, OffsetDateTime::now_utc()).expect("normalized");

	assert_eq!(record.external_id, "arxiv:2301.01234");
	assert_eq!(record.title, "Attention is all");
	assert_eq!(record.year, Some(2023));
	assert_eq!(record.url.as_deref(), Some("https://arxiv.org/pdf/2301.01234"));
}

#[test]
fn dedupe_keeps_first_seen_per_title_key() {
	let first = record("AI Ethics in Healthcare", SourceTag::PubMed);
	let second = record("ai ethics, in healthcare!", SourceTag::OpenAlex);
	let third = record("Healthcare bias", SourceTag::OpenAlex);
	let deduped = dedupe(vec![first.clone(), second, third.clone()]);

	assert_eq!(deduped.len(), 2);
	assert_eq!(deduped[0].id, first.id);
	assert_eq!(deduped[1].id, third.id);
}

#[test]
fn dedupe_is_idempotent() {
	let records = vec![
		record("One", SourceTag::PubMed),
		record("one", SourceTag::OpenAlex),
		record("Two", SourceTag::OpenAlex),
		record("Two.", SourceTag::PubMed),
		record("Three", SourceTag::PubMed),
	];
	let once = dedupe(records);
	let twice = dedupe(once.clone());

	assert_eq!(once, twice);
	assert_eq!(once.len(), 3);
}

#[test]
fn deduplicator_counts_discarded_records() {
	let mut deduplicator = Deduplicator::new();
	let kept = deduplicator.retain_new(vec![
		record("Same", SourceTag::PubMed),
		record("same", SourceTag::OpenAlex),
	]);

	assert_eq!(kept.len(), 1);
	assert_eq!(deduplicator.duplicates(), 1);
	assert!(deduplicator.contains(&record("SAME", SourceTag::OpenAlex)));
}

#[test]
fn two_sources_with_one_shared_title_yield_five_unique_records() {
	let pubmed = ["AI ethics review", "Bias in triage", "Consent and algorithms"];
	let openalex = ["AI Ethics Review", "Fairness audits", "Clinical decision support"];
	let mut raw = Vec::new();

	for (index, title) in pubmed.iter().enumerate() {
		raw.push(pubmed_article(&index.to_string(), title, "Abstract."));
	}

	let mut records = normalize(&raw, SourceTag::PubMed);
	let openalex_raw: Vec<_> = openalex
		.iter()
		.enumerate()
		.map(|(index, title)| openalex_work(&format!("W{index}"), title, &["Abstract."]))
		.collect();

	records.extend(normalize(&openalex_raw, SourceTag::OpenAlex));

	assert_eq!(dedupe(records).len(), 5);
}

#[test]
fn linear_quantile_matches_documented_cutoff() {
	let scores = [0.9, 0.8, 0.7, 0.6, 0.1];
	let cutoff = quantile::linear(&scores, 0.8).expect("cutoff");
	let kept = scores.iter().filter(|score| **score >= cutoff).count();

	assert!((cutoff - 0.82).abs() < 1e-5);
	assert_eq!(kept, 1);
	assert!(kept as f32 / scores.len() as f32 <= 1.0 - 0.8 + 1e-6);
}
