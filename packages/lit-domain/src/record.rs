use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceTag {
	#[serde(rename = "pubmed")]
	PubMed,
	#[serde(rename = "arxiv")]
	Arxiv,
	#[serde(rename = "openalex")]
	OpenAlex,
	#[serde(rename = "core")]
	Core,
	#[serde(rename = "semantic_scholar")]
	SemanticScholar,
}
impl SourceTag {
	pub const ALL: [SourceTag; 5] =
		[Self::PubMed, Self::Arxiv, Self::OpenAlex, Self::Core, Self::SemanticScholar];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::PubMed => "pubmed",
			Self::Arxiv => "arxiv",
			Self::OpenAlex => "openalex",
			Self::Core => "core",
			Self::SemanticScholar => "semantic_scholar",
		}
	}

	/// Prefix of the canonical `prefix:id` external identifier minted for this source.
	pub fn id_prefix(self) -> &'static str {
		match self {
			Self::PubMed => "pmid",
			Self::Arxiv => "arxiv",
			Self::OpenAlex => "openalex",
			Self::Core => "core",
			Self::SemanticScholar => "s2",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|tag| tag.as_str() == raw)
	}

	pub fn from_id_prefix(prefix: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|tag| tag.id_prefix() == prefix)
	}

	pub fn supports_citations(self) -> bool {
		matches!(self, Self::OpenAlex | Self::SemanticScholar)
	}
}

impl fmt::Display for SourceTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbstractSection {
	pub label: Option<String>,
	pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PubMedArticle {
	pub pmid: String,
	pub title: String,
	pub abstract_sections: Vec<AbstractSection>,
	pub authors: Vec<String>,
	pub year: Option<i32>,
	pub journal: Option<String>,
	pub doi: Option<String>,
	pub pmc: Option<String>,
	pub mesh_terms: Vec<String>,
	pub publication_types: Vec<String>,
	#[serde(default)]
	pub references: Vec<PubMedReference>,
}

/// One `ReferenceList` entry, by whichever ids PubMed lists for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PubMedReference {
	pub pmid: Option<String>,
	pub doi: Option<String>,
	pub pmc: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArxivEntry {
	/// The `abs` landing URL as published in the Atom feed, version suffix included.
	pub id: String,
	pub title: String,
	pub summary: String,
	pub authors: Vec<String>,
	pub published: Option<String>,
	pub pdf_url: Option<String>,
	pub doi: Option<String>,
	pub journal_ref: Option<String>,
	pub categories: Vec<String>,
}

/// A connector result before normalization.
///
/// XML sources are parsed into typed structs by their connector; JSON sources keep the
/// provider payload as-is and are read by a per-source extraction function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "payload")]
pub enum RawRecord {
	#[serde(rename = "pubmed")]
	PubMed(PubMedArticle),
	#[serde(rename = "arxiv")]
	Arxiv(ArxivEntry),
	#[serde(rename = "openalex")]
	OpenAlex(Value),
	#[serde(rename = "core")]
	Core(Value),
	#[serde(rename = "semantic_scholar")]
	SemanticScholar(Value),
}
impl RawRecord {
	pub fn source(&self) -> SourceTag {
		match self {
			Self::PubMed(_) => SourceTag::PubMed,
			Self::Arxiv(_) => SourceTag::Arxiv,
			Self::OpenAlex(_) => SourceTag::OpenAlex,
			Self::Core(_) => SourceTag::Core,
			Self::SemanticScholar(_) => SourceTag::SemanticScholar,
		}
	}

	pub fn to_value(&self) -> Value {
		serde_json::to_value(self).unwrap_or(Value::Null)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
	pub doi: Option<String>,
	pub pmid: Option<String>,
	pub arxiv: Option<String>,
	pub core: Option<String>,
	pub openalex: Option<String>,
	pub semantic_scholar: Option<String>,
}
impl ExternalIds {
	/// Every canonical `prefix:id` form this record can be addressed by.
	pub fn canonical_ids(&self) -> Vec<String> {
		let mut out = Vec::new();

		for (prefix, value) in [
			("doi", &self.doi),
			("pmid", &self.pmid),
			("arxiv", &self.arxiv),
			("core", &self.core),
			("openalex", &self.openalex),
			("s2", &self.semantic_scholar),
		] {
			if let Some(value) = value {
				out.push(format!("{prefix}:{value}"));
			}
		}

		out
	}

	/// Native identifier of this record within the given source, if known.
	pub fn native(&self, source: SourceTag) -> Option<&str> {
		match source {
			SourceTag::PubMed => self.pmid.as_deref(),
			SourceTag::Arxiv => self.arxiv.as_deref(),
			SourceTag::OpenAlex => self.openalex.as_deref(),
			SourceTag::Core => self.core.as_deref(),
			SourceTag::SemanticScholar => self.semantic_scholar.as_deref(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
	pub id: Uuid,
	pub source: SourceTag,
	pub title: String,
	pub authors: Vec<String>,
	#[serde(rename = "abstract")]
	pub abstract_text: String,
	pub external_id: String,
	pub ids: ExternalIds,
	pub year: Option<i32>,
	pub journal: Option<String>,
	pub url: Option<String>,
	pub citation_count: Option<u64>,
	pub publication_type: Option<String>,
	pub tags: Vec<String>,
	pub raw: Value,
	#[serde(with = "crate::time_serde")]
	pub retrieved_at: OffsetDateTime,
}
impl NormalizedRecord {
	/// Canonical ids that refer to this record, used to keep self-links out of expansion.
	pub fn known_ids(&self) -> Vec<String> {
		let mut ids = self.ids.canonical_ids();

		if !ids.contains(&self.external_id) {
			ids.push(self.external_id.clone());
		}

		ids
	}

	pub fn embedding_text(&self) -> String {
		format!("{}. {}", self.title, self.abstract_text)
	}
}
