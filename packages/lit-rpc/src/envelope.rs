use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub const TASK_RESULT: &str = "task_result";

/// A logical remote call, before a correlation id is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
	pub call_kind: String,
	pub context_id: String,
	pub agent_type: String,
	pub action: String,
	pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallData {
	pub correlation_id: String,
	pub context_id: String,
	pub agent_type: String,
	pub action: String,
	pub payload: Value,
}

/// Frame written to the shared connection for every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
	pub call_kind: String,
	pub data: CallData,
	pub client_id: String,
	pub timestamp: String,
}
impl OutboundEnvelope {
	pub fn new(request: &CallRequest, correlation_id: &str, client_id: &str) -> Self {
		let timestamp = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();

		Self {
			call_kind: request.call_kind.clone(),
			data: CallData {
				correlation_id: correlation_id.to_string(),
				context_id: request.context_id.clone(),
				agent_type: request.agent_type.clone(),
				action: request.action.clone(),
				payload: request.payload.clone(),
			},
			client_id: client_id.to_string(),
			timestamp,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
	Completed,
	Failed,
}

/// Any frame read from the shared connection. Only `task_result` frames carry replies;
/// other frame types belong to other consumers of the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub correlation_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<ReplyStatus>,
	#[serde(default)]
	pub result: Value,
}
impl InboundFrame {
	pub fn completed(correlation_id: &str, result: Value) -> Self {
		Self {
			kind: TASK_RESULT.to_string(),
			correlation_id: Some(correlation_id.to_string()),
			status: Some(ReplyStatus::Completed),
			result,
		}
	}

	pub fn failed(correlation_id: &str, message: &str) -> Self {
		Self {
			kind: TASK_RESULT.to_string(),
			correlation_id: Some(correlation_id.to_string()),
			status: Some(ReplyStatus::Failed),
			result: serde_json::json!({ "error": message }),
		}
	}

	pub fn is_reply(&self) -> bool {
		self.kind == TASK_RESULT
	}

	/// Human-readable failure message carried by a failed reply.
	pub fn failure_message(&self) -> String {
		match &self.result {
			Value::String(message) => message.clone(),
			Value::Object(map) => map
				.get("error")
				.or_else(|| map.get("message"))
				.and_then(Value::as_str)
				.map(str::to_string)
				.unwrap_or_else(|| self.result.to_string()),
			Value::Null => "remote reported failure without details".to_string(),
			other => other.to_string(),
		}
	}
}
