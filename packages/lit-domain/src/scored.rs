use serde::{Deserialize, Serialize};

use crate::record::NormalizedRecord;

/// How a document entered the candidate set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
	#[default]
	None,
	Reference,
	Citation,
	Both,
}
impl Provenance {
	pub fn merge(self, other: Self) -> Self {
		match (self, other) {
			(Self::None, other) => other,
			(current, Self::None) => current,
			(lhs, rhs) if lhs == rhs => lhs,
			_ => Self::Both,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
	#[serde(flatten)]
	pub record: NormalizedRecord,
	pub score: f32,
	pub provenance: Provenance,
}
impl ScoredDocument {
	pub fn new(record: NormalizedRecord, score: f32) -> Self {
		Self { record, score, provenance: Provenance::None }
	}

	pub fn with_provenance(self, provenance: Provenance) -> Self {
		Self { provenance, ..self }
	}
}

/// A paper id discovered through the citation graph, in canonical `prefix:id` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpansionCandidate {
	pub id: String,
	pub provenance: Provenance,
}
