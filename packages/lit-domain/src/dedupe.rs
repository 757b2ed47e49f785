use std::collections::HashSet;

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::record::NormalizedRecord;

/// Lowercased, accent-folded title with punctuation removed and whitespace collapsed.
pub fn title_key(title: &str) -> String {
	let mut stripped = String::with_capacity(title.len());

	for ch in title.nfkd() {
		if is_combining_mark(ch) {
			continue;
		}
		if ch.is_alphanumeric() || ch.is_whitespace() {
			stripped.extend(ch.to_lowercase());
		}
	}

	stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keeps the first record seen per title key; remembers keys across calls so later
/// rounds can be checked against everything already accepted.
#[derive(Debug, Default)]
pub struct Deduplicator {
	seen: HashSet<String>,
	duplicates: usize,
}
impl Deduplicator {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn key_for(record: &NormalizedRecord) -> String {
		let key = title_key(&record.title);

		// Untitled records fall back to their identifier so they never collapse together.
		if key.is_empty() { format!("id:{}", record.external_id) } else { key }
	}

	pub fn accept(&mut self, record: &NormalizedRecord) -> bool {
		if self.seen.insert(Self::key_for(record)) {
			true
		} else {
			self.duplicates += 1;

			false
		}
	}

	pub fn retain_new(&mut self, records: Vec<NormalizedRecord>) -> Vec<NormalizedRecord> {
		records.into_iter().filter(|record| self.accept(record)).collect()
	}

	pub fn contains(&self, record: &NormalizedRecord) -> bool {
		self.seen.contains(&Self::key_for(record))
	}

	pub fn duplicates(&self) -> usize {
		self.duplicates
	}
}

pub fn dedupe(records: Vec<NormalizedRecord>) -> Vec<NormalizedRecord> {
	Deduplicator::new().retain_new(records)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn title_key_folds_case_accents_and_punctuation() {
		assert_eq!(title_key("  Café   Effects: A Review! "), "cafe effects a review");
		assert_eq!(title_key("AI-Ethics"), "aiethics");
	}
}
