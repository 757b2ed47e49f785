use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Research plan text, either free text or a structured plan document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResearchPlan {
	Text(String),
	Structured(Value),
}
impl ResearchPlan {
	/// Flattens the plan to the text that gets embedded.
	///
	/// Structured plans contribute their string leaves in document order, with the
	/// `objective` field first when present.
	pub fn to_text(&self) -> String {
		match self {
			Self::Text(text) => text.trim().to_string(),
			Self::Structured(value) => {
				let mut parts = Vec::new();

				if let Some(objective) = value.get("objective") {
					collect_leaves(objective, &mut parts);
				}
				if let Value::Object(map) = value {
					for (key, child) in map {
						if key != "objective" {
							collect_leaves(child, &mut parts);
						}
					}
				} else {
					collect_leaves(value, &mut parts);
				}

				parts.join("\n")
			},
		}
	}

	pub fn is_empty(&self) -> bool {
		self.to_text().is_empty()
	}
}

fn collect_leaves(value: &Value, out: &mut Vec<String>) {
	match value {
		Value::String(text) => {
			let trimmed = text.trim();

			if !trimmed.is_empty() {
				out.push(trimmed.to_string());
			}
		},
		Value::Array(items) => items.iter().for_each(|item| collect_leaves(item, out)),
		Value::Object(map) => map.values().for_each(|item| collect_leaves(item, out)),
		_ => {},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn structured_plan_puts_objective_first() {
		let plan = ResearchPlan::Structured(serde_json::json!({
			"questions": ["Does bias persist?", ""],
			"objective": "AI ethics in healthcare",
			"scope": { "population": "hospitals" }
		}));

		assert_eq!(plan.to_text(), "AI ethics in healthcare\nDoes bias persist?\nhospitals");
	}

	#[test]
	fn structured_plan_keeps_document_order() {
		let plan: ResearchPlan = serde_json::from_str(
			r#"{"scope":"zeta scope","aims":"alpha aims","methods":{"b":"second","a":"third"}}"#,
		)
		.expect("Failed to parse plan.");

		assert_eq!(plan.to_text(), "zeta scope\nalpha aims\nsecond\nthird");
	}

	#[test]
	fn blank_text_plan_is_empty() {
		assert!(ResearchPlan::Text("   ".to_string()).is_empty());
	}
}
