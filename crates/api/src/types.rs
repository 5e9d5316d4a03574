use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::ids::{ConversationId, MessageId};
use super::timestamp;

/// Title shown for conversations created without one.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Model the backend falls back to when a request names none.
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Ratio the compression endpoint reports when a request names none.
pub const DEFAULT_COMPRESSION_RATIO: f64 = 0.3;

/// Number of trailing messages the context endpoint returns by default.
pub const DEFAULT_CONTEXT_WINDOW: u32 = 10;

/// Marker the backend puts in front of compressed message content.
pub const COMPRESSED_PREFIX: &str = "[COMPRESSED] ";

const ZERO_DECIMAL: &str = "0.00";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One immutable entry in a conversation thread.
///
/// `cost` and `carbon_footprint` stay decimal strings, exactly as the backend
/// stores them; use [`decimal_value`] to read them numerically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub model_used: String,
    #[serde(default)]
    pub token_count: u64,
    #[serde(default = "zero_decimal")]
    pub cost: String,
    #[serde(default = "zero_decimal")]
    pub carbon_footprint: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Conversation aggregate as returned by the backend.
///
/// List responses carry summaries with an empty `messages` vector; the detail
/// endpoint fills it in chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub title: Option<String>,
    pub current_model: String,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default = "zero_decimal")]
    pub estimated_cost: String,
    #[serde(default = "zero_decimal")]
    pub estimated_carbon: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Title, or the default label when it is missing or blank.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_CONVERSATION_TITLE)
    }

    /// Appends a message and re-derives the aggregate counters from the thread.
    pub fn append_message(&mut self, message: Message) {
        self.messages.push(message);
        self.recompute_totals();
    }

    /// Restores `message_count` and `total_tokens` from `messages`.
    pub fn recompute_totals(&mut self) {
        self.message_count = self.messages.len() as u64;
        self.total_tokens = self.messages.iter().map(|message| message.token_count).sum();
    }

    /// Copy without the message thread, the shape list responses use.
    pub fn to_summary(&self) -> Self {
        Self {
            messages: Vec::new(),
            ..self.clone()
        }
    }
}

/// Closed set of providers the client knows how to present.
///
/// Any other wire value resolves to [`Provider::Unknown`] instead of failing
/// the whole payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    Other,
    Unknown,
}

impl Provider {
    /// Case-insensitive parse; never fails.
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Self::OpenAi,
            "anthropic" => Self::Anthropic,
            "google" => Self::Google,
            "other" => Self::Other,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }
}

impl From<String> for Provider {
    fn from(value: String) -> Self {
        Self::from_wire(&value)
    }
}

impl From<Provider> for String {
    fn from(value: Provider) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: Provider,
    pub model: String,
    #[serde(default)]
    pub max_tokens: u64,
    #[serde(default)]
    pub supports_functions: bool,
}

/// Catalog entry; `name` is the key used in requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub info: ModelInfo,
}

impl Model {
    pub fn new(name: impl Into<String>, info: ModelInfo) -> Self {
        Self {
            name: name.into(),
            info,
        }
    }
}

/// Sustainability figures in grams of CO2.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CarbonStats {
    pub total_carbon: f64,
    pub monthly_budget: f64,
    pub daily_average: f64,
}

/// Body of the create-conversation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConversation {
    pub title: Option<String>,
    pub initial_model: String,
}

impl NewConversation {
    pub fn new(initial_model: impl Into<String>) -> Self {
        Self {
            title: None,
            initial_model: initial_model.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub content: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

impl NewMessage {
    pub fn new(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Role/content pair accepted by the cost estimation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateMessage {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub model: String,
    pub estimated_cost: String,
    pub estimated_carbon_footprint: String,
    pub message_count: u64,
}

/// Aggregates computed by the backend over a stored thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub title: Option<String>,
    pub message_count: u64,
    pub total_tokens: u64,
    pub total_cost: String,
    pub total_carbon: String,
    #[serde(default)]
    pub models_used: Vec<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySearchRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySearchHit {
    pub message_id: MessageId,
    pub content: String,
    pub role: MessageRole,
    pub similarity_score: f64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub conversation_id: ConversationId,
}

/// Body of the context compression request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressRequest {
    pub conversation_id: ConversationId,
    #[serde(default = "default_compression_ratio")]
    pub target_ratio: f64,
}

impl CompressRequest {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            target_ratio: DEFAULT_COMPRESSION_RATIO,
        }
    }
}

/// Result of compressing the middle of a conversation thread.
///
/// `compressed_messages` counts every compressed message in the thread, not
/// only those rewritten by this call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionReport {
    pub conversation_id: ConversationId,
    pub total_messages: u64,
    pub compressed_messages: u64,
    pub compression_ratio: f64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub message_id: MessageId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub model_used: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_compressed: bool,
}

/// One message as the backend would feed it to a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub role: MessageRole,
    pub content: String,
    pub metadata: ContextMetadata,
}

/// Trailing window of a conversation in chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub context: Vec<ContextEntry>,
    #[serde(default)]
    pub message_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

/// Reads a backend decimal string, treating anything unparseable as zero.
pub fn decimal_value(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

fn default_compression_ratio() -> f64 {
    DEFAULT_COMPRESSION_RATIO
}

fn zero_decimal() -> String {
    ZERO_DECIMAL.to_string()
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn message(id: u64, tokens: u64) -> Message {
        Message {
            id: MessageId::new(id),
            role: MessageRole::Assistant,
            content: format!("reply {id}"),
            model_used: "gpt-4".to_string(),
            token_count: tokens,
            cost: "0.01".to_string(),
            carbon_footprint: "0.001".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn decodes_backend_conversation_payload() {
        let payload = r#"{
            "id": 4,
            "title": null,
            "current_model": "gpt-4",
            "message_count": 2,
            "total_tokens": 9,
            "estimated_cost": "0.01",
            "estimated_carbon": "0.001",
            "created_at": "2024-03-05T10:00:00.123456+00:00",
            "messages": [
                {"id": 1, "role": "user", "content": "hello there", "model_used": "user",
                 "token_count": 2, "cost": "0.0", "carbon_footprint": "0.0",
                 "created_at": "2024-03-05T10:00:01"},
                {"id": 2, "role": "assistant", "content": "Mock response to: hello there",
                 "model_used": null, "token_count": 7, "cost": "0.01",
                 "carbon_footprint": "0.001", "created_at": "2024-03-05T10:00:02"}
            ]
        }"#;

        let conversation: Conversation = serde_json::from_str(payload).unwrap();
        assert_eq!(conversation.id, ConversationId::new(4));
        assert_eq!(conversation.display_title(), DEFAULT_CONVERSATION_TITLE);
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, MessageRole::User);
        assert_eq!(conversation.messages[1].model_used, "");
    }

    #[test]
    fn append_message_keeps_counters_derived_from_thread() {
        let mut conversation = Conversation {
            id: ConversationId::new(1),
            title: Some("Trip".to_string()),
            current_model: "gpt-4".to_string(),
            message_count: 0,
            total_tokens: 0,
            estimated_cost: "0.00".to_string(),
            estimated_carbon: "0.00".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap(),
            messages: Vec::new(),
        };

        conversation.append_message(message(1, 4));
        conversation.append_message(message(2, 6));

        assert_eq!(conversation.message_count, 2);
        assert_eq!(conversation.total_tokens, 10);
        assert!(conversation.to_summary().messages.is_empty());
        assert_eq!(conversation.to_summary().message_count, 2);
    }

    #[test]
    fn unknown_provider_strings_never_fail_decoding() {
        let info: ModelInfo = serde_json::from_str(
            r#"{"provider": "mistral", "model": "mixtral", "max_tokens": 32000,
                "supports_functions": false}"#,
        )
        .unwrap();
        assert_eq!(info.provider, Provider::Unknown);
        assert_eq!(Provider::from_wire("OpenAI"), Provider::OpenAi);
        assert_eq!(Provider::from_wire("other"), Provider::Other);
    }

    #[test]
    fn new_message_omits_unset_tuning_fields() {
        let encoded = serde_json::to_value(NewMessage::new("hi", "gpt-4")).unwrap();
        assert_eq!(encoded, serde_json::json!({"content": "hi", "model": "gpt-4"}));
    }

    #[test]
    fn decodes_context_window_payload() {
        let payload = r#"{
            "conversation_id": 3,
            "context": [
                {"role": "assistant", "content": "[COMPRESSED] long answer...",
                 "metadata": {"message_id": 8, "model_used": null,
                              "created_at": "2024-03-05T10:00:02", "is_compressed": true}}
            ],
            "message_count": 1
        }"#;

        let context: ConversationContext = serde_json::from_str(payload).unwrap();
        assert_eq!(context.message_count, 1);
        assert!(context.context[0].metadata.is_compressed);
        assert_eq!(context.context[0].metadata.model_used, "");

        let request: CompressRequest = serde_json::from_str(r#"{"conversation_id": 3}"#).unwrap();
        assert_eq!(request, CompressRequest::new(ConversationId::new(3)));
    }

    #[test]
    fn decimal_value_treats_garbage_as_zero() {
        assert_eq!(decimal_value(" 1.5 "), 1.5);
        assert_eq!(decimal_value("n/a"), 0.0);
        assert_eq!(decimal_value("NaN"), 0.0);
    }
}
