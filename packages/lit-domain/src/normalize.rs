use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::record::{
	ArxivEntry, ExternalIds, NormalizedRecord, PubMedArticle, RawRecord, SourceTag,
};

static ARXIV_VERSION: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"v\d+$").expect("Static regex must compile."));

/// Fields every source converges on before the canonical record is built.
#[derive(Debug, Default)]
struct Extracted {
	title: String,
	abstract_text: String,
	authors: Vec<String>,
	year: Option<i32>,
	journal: Option<String>,
	ids: ExternalIds,
	native_pdf: Option<String>,
	derived_pdf: Option<String>,
	landing: Option<String>,
	citation_count: Option<u64>,
	publication_type: Option<String>,
	tags: Vec<String>,
}

/// Normalizes a batch of connector results from `source`.
///
/// Records without an abstract are dropped, as are records whose payload belongs to a
/// different source than the one the batch was fetched from.
pub fn normalize(raw_records: &[RawRecord], source: SourceTag) -> Vec<NormalizedRecord> {
	let now = OffsetDateTime::now_utc();

	raw_records
		.iter()
		.filter(|raw| raw.source() == source)
		.filter_map(|raw| normalize_one(raw, now))
		.collect()
}

pub fn normalize_one(raw: &RawRecord, retrieved_at: OffsetDateTime) -> Option<NormalizedRecord> {
	let extracted = match raw {
		RawRecord::PubMed(article) => extract_pubmed(article),
		RawRecord::Arxiv(entry) => extract_arxiv(entry),
		RawRecord::OpenAlex(value) => extract_openalex(value),
		RawRecord::Core(value) => extract_core(value),
		RawRecord::SemanticScholar(value) => extract_semantic_scholar(value),
	};
	let abstract_text = collapse_whitespace(&extracted.abstract_text);

	if abstract_text.is_empty() {
		return None;
	}

	let source = raw.source();
	let id = Uuid::new_v4();
	let external_id = canonical_external_id(source, &extracted.ids)
		.unwrap_or_else(|| format!("urn:uuid:{id}"));
	let url = extracted
		.native_pdf
		.or(extracted.derived_pdf)
		.or_else(|| extracted.ids.doi.as_ref().map(|doi| format!("https://doi.org/{doi}")))
		.or(extracted.landing);

	Some(NormalizedRecord {
		id,
		source,
		title: collapse_whitespace(&extracted.title),
		authors: extracted.authors,
		abstract_text,
		external_id,
		ids: extracted.ids,
		year: extracted.year,
		journal: extracted.journal,
		url,
		citation_count: extracted.citation_count,
		publication_type: extracted.publication_type,
		tags: extracted.tags,
		raw: raw.to_value(),
		retrieved_at,
	})
}

/// Builds the `prefix:id` string for a record, preferring the source's own id and
/// falling back to the DOI.
pub fn canonical_external_id(source: SourceTag, ids: &ExternalIds) -> Option<String> {
	if let Some(native) = ids.native(source) {
		return Some(format!("{}:{native}", source.id_prefix()));
	}

	ids.doi.as_ref().map(|doi| format!("doi:{doi}"))
}

/// Strips the `abs` URL prefix and the version suffix from an arXiv identifier.
pub fn arxiv_id(raw: &str) -> Option<String> {
	let trimmed = raw.trim();
	let without_prefix = match trimmed.find("/abs/") {
		Some(pos) => &trimmed[pos + "/abs/".len()..],
		None => trimmed.strip_prefix("arXiv:").unwrap_or(trimmed),
	};
	let id = ARXIV_VERSION.replace(without_prefix, "");

	if id.is_empty() { None } else { Some(id.into_owned()) }
}

/// Lowercases a DOI and strips any resolver prefix.
pub fn clean_doi(raw: &str) -> Option<String> {
	let trimmed = raw.trim();
	let lowered = trimmed.to_ascii_lowercase();
	let stripped = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"]
		.iter()
		.find_map(|prefix| lowered.strip_prefix(prefix))
		.unwrap_or(lowered.as_str());

	if stripped.is_empty() { None } else { Some(stripped.to_string()) }
}

/// Last path segment of an identifier URL such as `https://openalex.org/W2741809807`.
pub fn url_suffix(raw: &str) -> Option<String> {
	let segment = raw.trim().trim_end_matches('/').rsplit('/').next()?;

	if segment.is_empty() { None } else { Some(segment.to_string()) }
}

fn extract_pubmed(article: &PubMedArticle) -> Extracted {
	let abstract_text = article
		.abstract_sections
		.iter()
		.filter(|section| !section.text.trim().is_empty())
		.map(|section| match section.label.as_deref() {
			Some(label) if !label.trim().is_empty() =>
				format!("{}: {}", label.trim(), section.text),
			_ => section.text.clone(),
		})
		.collect::<Vec<_>>()
		.join(" ");
	let pmid = non_empty(&article.pmid);
	let derived_pdf = article
		.pmc
		.as_deref()
		.and_then(non_empty)
		.map(|pmc| format!("https://www.ncbi.nlm.nih.gov/pmc/articles/{pmc}/pdf/"));
	let landing = pmid.as_ref().map(|pmid| format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}/"));

	Extracted {
		title: article.title.clone(),
		abstract_text,
		authors: article.authors.clone(),
		year: article.year,
		journal: article.journal.clone(),
		ids: ExternalIds {
			doi: article.doi.as_deref().and_then(clean_doi),
			pmid,
			..ExternalIds::default()
		},
		native_pdf: None,
		derived_pdf,
		landing,
		citation_count: None,
		publication_type: article.publication_types.first().cloned(),
		tags: article.mesh_terms.clone(),
	}
}

fn extract_arxiv(entry: &ArxivEntry) -> Extracted {
	let id = arxiv_id(&entry.id);
	let year = entry.published.as_deref().and_then(year_prefix);

	Extracted {
		title: entry.title.clone(),
		abstract_text: entry.summary.clone(),
		authors: entry.authors.clone(),
		year,
		journal: entry.journal_ref.clone(),
		native_pdf: entry.pdf_url.clone(),
		derived_pdf: id.as_ref().map(|id| format!("https://arxiv.org/pdf/{id}")),
		landing: id.as_ref().map(|id| format!("https://arxiv.org/abs/{id}")),
		ids: ExternalIds {
			doi: entry.doi.as_deref().and_then(clean_doi),
			arxiv: id,
			..ExternalIds::default()
		},
		citation_count: None,
		publication_type: Some("preprint".to_string()),
		tags: entry.categories.clone(),
	}
}

fn extract_openalex(value: &Value) -> Extracted {
	let abstract_text = first_str(value, &["abstract"])
		.or_else(|| lookup(value, "abstract_inverted_index").and_then(rebuild_inverted_index))
		.unwrap_or_default();
	let landing = first_str(value, &["primary_location.landing_page_url", "id"]);

	Extracted {
		title: first_str(value, &["title", "display_name"]).unwrap_or_default(),
		abstract_text,
		authors: collect_strs(value, "authorships", &["author.display_name", "raw_author_name"]),
		year: first_i32(value, &["publication_year"]),
		journal: first_str(
			value,
			&["primary_location.source.display_name", "host_venue.display_name"],
		),
		ids: ExternalIds {
			doi: first_str(value, &["doi", "ids.doi"]).as_deref().and_then(clean_doi),
			pmid: first_str(value, &["ids.pmid"]).as_deref().and_then(url_suffix),
			openalex: first_str(value, &["id", "ids.openalex"]).as_deref().and_then(url_suffix),
			..ExternalIds::default()
		},
		native_pdf: first_str(
			value,
			&["best_oa_location.pdf_url", "open_access.oa_url", "primary_location.pdf_url"],
		),
		derived_pdf: None,
		landing,
		citation_count: first_u64(value, &["cited_by_count"]),
		publication_type: first_str(value, &["type"]),
		tags: collect_strs(value, "concepts", &["display_name"]),
	}
}

fn extract_core(value: &Value) -> Extracted {
	let landing = lookup(value, "links").and_then(Value::as_array).and_then(|links| {
		links.iter().find_map(|link| {
			if link.get("type").and_then(Value::as_str) == Some("display") {
				link.get("url").and_then(Value::as_str).map(str::to_string)
			} else {
				None
			}
		})
	});

	Extracted {
		title: first_str(value, &["title"]).unwrap_or_default(),
		abstract_text: first_str(value, &["abstract", "description"]).unwrap_or_default(),
		authors: collect_strs(value, "authors", &["name"]),
		year: first_i32(value, &["yearPublished", "year"]),
		journal: first_str(value, &["journals.0.title", "publisher"]),
		ids: ExternalIds {
			doi: first_str(value, &["doi"]).as_deref().and_then(clean_doi),
			pmid: first_str(value, &["pubmedId"]),
			arxiv: first_str(value, &["arxivId"]).as_deref().and_then(arxiv_id),
			core: first_str(value, &["id"]),
			..ExternalIds::default()
		},
		native_pdf: first_str(value, &["downloadUrl", "sourceFulltextUrls.0"]),
		derived_pdf: None,
		landing,
		citation_count: first_u64(value, &["citationCount"]),
		publication_type: first_str(value, &["documentType"]),
		tags: collect_strs(value, "fieldOfStudy", &[""]),
	}
}

fn extract_semantic_scholar(value: &Value) -> Extracted {
	let mut tags = collect_strs(value, "fieldsOfStudy", &[""]);

	if tags.is_empty() {
		tags = collect_strs(value, "s2FieldsOfStudy", &["category"]);
	}

	Extracted {
		title: first_str(value, &["title"]).unwrap_or_default(),
		abstract_text: first_str(value, &["abstract", "tldr.text"]).unwrap_or_default(),
		authors: collect_strs(value, "authors", &["name"]),
		year: first_i32(value, &["year"]),
		journal: first_str(value, &["journal.name", "venue"]),
		ids: ExternalIds {
			doi: first_str(value, &["externalIds.DOI"]).as_deref().and_then(clean_doi),
			pmid: first_str(value, &["externalIds.PubMed"]),
			arxiv: first_str(value, &["externalIds.ArXiv"]).as_deref().and_then(arxiv_id),
			semantic_scholar: first_str(value, &["paperId"]),
			..ExternalIds::default()
		},
		native_pdf: first_str(value, &["openAccessPdf.url"]),
		derived_pdf: None,
		landing: first_str(value, &["url"]),
		citation_count: first_u64(value, &["citationCount"]),
		publication_type: first_str(value, &["publicationTypes.0"]),
		tags,
	}
}

/// Resolves a dotted path; numeric segments index into arrays and an empty path is the
/// value itself.
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
	if path.is_empty() {
		return Some(value);
	}

	let mut current = value;

	for segment in path.split('.') {
		current = match current {
			Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
			Value::Object(map) => map.get(segment)?,
			_ => return None,
		};
	}

	Some(current)
}

fn as_text(value: &Value) -> Option<String> {
	match value {
		Value::String(raw) => non_empty(raw),
		Value::Number(number) => Some(number.to_string()),
		_ => None,
	}
}

fn first_str(value: &Value, paths: &[&str]) -> Option<String> {
	paths.iter().find_map(|path| lookup(value, path).and_then(as_text))
}

fn first_i32(value: &Value, paths: &[&str]) -> Option<i32> {
	paths.iter().find_map(|path| {
		let found = lookup(value, path)?;

		found
			.as_i64()
			.and_then(|year| i32::try_from(year).ok())
			.or_else(|| found.as_str().and_then(year_prefix))
	})
}

fn first_u64(value: &Value, paths: &[&str]) -> Option<u64> {
	paths.iter().find_map(|path| lookup(value, path).and_then(Value::as_u64))
}

/// Reads `field` from every element of the array at `array_path`, taking the first
/// non-empty field per element.
fn collect_strs(value: &Value, array_path: &str, fields: &[&str]) -> Vec<String> {
	let Some(items) = lookup(value, array_path).and_then(Value::as_array) else {
		return Vec::new();
	};

	items.iter().filter_map(|item| first_str(item, fields)).collect()
}

fn rebuild_inverted_index(index: &Value) -> Option<String> {
	let map = index.as_object()?;
	let mut positioned: Vec<(u64, &str)> = Vec::new();

	for (word, positions) in map {
		for position in positions.as_array().into_iter().flatten() {
			if let Some(position) = position.as_u64() {
				positioned.push((position, word.as_str()));
			}
		}
	}

	if positioned.is_empty() {
		return None;
	}

	positioned.sort_by_key(|(position, _)| *position);

	Some(positioned.into_iter().map(|(_, word)| word).collect::<Vec<_>>().join(" "))
}

fn year_prefix(raw: &str) -> Option<i32> {
	raw.trim().get(..4)?.parse().ok()
}

fn non_empty(raw: &str) -> Option<String> {
	let trimmed = raw.trim();

	if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

fn collapse_whitespace(raw: &str) -> String {
	raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_arxiv_prefix_and_version() {
		assert_eq!(arxiv_id("http://arxiv.org/abs/2101.00001v3").as_deref(), Some("2101.00001"));
		assert_eq!(
			arxiv_id("http://arxiv.org/abs/hep-th/9901001v1").as_deref(),
			Some("hep-th/9901001")
		);
		assert_eq!(arxiv_id("arXiv:1706.03762").as_deref(), Some("1706.03762"));
	}

	#[test]
	fn cleans_doi_resolver_prefix() {
		assert_eq!(
			clean_doi("https://doi.org/10.7717/PeerJ.4375").as_deref(),
			Some("10.7717/peerj.4375")
		);
		assert_eq!(clean_doi("  "), None);
	}

	#[test]
	fn rebuilds_openalex_abstract_in_position_order() {
		let index = serde_json::json!({
			"learning": [1],
			"Deep": [0],
			"works.": [2]
		});

		assert_eq!(rebuild_inverted_index(&index).as_deref(), Some("Deep learning works."));
	}

	#[test]
	fn lookup_walks_arrays_and_objects() {
		let value = serde_json::json!({ "journals": [{ "title": "Nature" }] });

		assert_eq!(first_str(&value, &["missing", "journals.0.title"]).as_deref(), Some("Nature"));
	}

	#[test]
	fn first_present_non_empty_field_wins() {
		let value = serde_json::json!({ "abstract": "  ", "description": "Fallback text." });

		assert_eq!(
			first_str(&value, &["abstract", "description"]).as_deref(),
			Some("Fallback text.")
		);
	}
}
