//! In-process backend that answers the REST contract without a server.
//!
//! It reproduces the observable behaviour of the ContextLink service: integer
//! ids, a canned assistant reply per message, word-count token totals, flat
//! per-reply cost and carbon, and soft deletion. Soft deletion only hides a
//! conversation from the list; lookups by id still reach it.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};
use snafu::OptionExt;
use tokio::sync::RwLock;

use super::error::{ApiResult, NotFoundSnafu, RejectedSnafu};
use super::ids::{ConversationId, MessageId};
use super::types::{
    COMPRESSED_PREFIX, CompressRequest, CompressionReport, ContextEntry, ContextMetadata,
    Conversation, ConversationContext, ConversationSummary, CostEstimate, EstimateMessage,
    HealthStatus, MemorySearchHit, MemorySearchRequest, Message, MessageRole, Model, ModelInfo,
    NewConversation, NewMessage, Provider, decimal_value,
};
use super::{BoxFuture, ConversationApi, MemoryApi, ModelApi};

pub const MOCK_REPLY_PREFIX: &str = "Mock response to: ";
const USER_MODEL_LABEL: &str = "user";
const ASSISTANT_REPLY_COST: f64 = 0.01;
const ASSISTANT_REPLY_CARBON: f64 = 0.001;
const LIST_LIMIT: usize = 20;
const TOKENS_PER_WORD: f64 = 1.3;
/// Threads at or below this length are never compressed.
const COMPRESSION_MIN_MESSAGES: usize = 5;
/// Messages kept verbatim at each end of a compressed thread.
const COMPRESSION_KEEP_EDGES: usize = 2;
const COMPRESSED_SUMMARY_CHARS: usize = 200;

#[derive(Debug, Clone)]
struct StoredConversation {
    record: Conversation,
    updated_at: DateTime<Utc>,
    is_active: bool,
    compressed: BTreeSet<MessageId>,
}

#[derive(Debug, Default)]
struct MemoryState {
    last_conversation_id: u64,
    last_message_id: u64,
    last_tick: Option<DateTime<Utc>>,
    conversations: Vec<StoredConversation>,
}

impl MemoryState {
    /// Wall clock that never repeats, so recency ordering stays total.
    fn tick(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_tick.filter(|last| now <= *last) {
            now = last + TimeDelta::microseconds(1);
        }
        self.last_tick = Some(now);
        now
    }

    fn next_message_id(&mut self) -> MessageId {
        self.last_message_id = self.last_message_id.saturating_add(1);
        MessageId::new(self.last_message_id)
    }

    fn find_mut(
        &mut self,
        stage: &'static str,
        conversation_id: ConversationId,
    ) -> ApiResult<&mut StoredConversation> {
        self.conversations
            .iter_mut()
            .find(|stored| stored.record.id == conversation_id)
            .context(NotFoundSnafu {
                stage,
                entity: "conversation",
                id: conversation_id.to_string(),
            })
    }

    fn find(
        &self,
        stage: &'static str,
        conversation_id: ConversationId,
    ) -> ApiResult<&StoredConversation> {
        self.conversations
            .iter()
            .find(|stored| stored.record.id == conversation_id)
            .context(NotFoundSnafu {
                stage,
                entity: "conversation",
                id: conversation_id.to_string(),
            })
    }
}

/// [`ChatBackend`](crate::ChatBackend) kept entirely in process memory.
#[derive(Debug)]
pub struct MemoryBackend {
    models: Vec<Model>,
    state: RwLock<MemoryState>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::with_default_catalog()
    }
}

impl MemoryBackend {
    /// Empty backend serving the given model catalog.
    pub fn new(models: Vec<Model>) -> Self {
        Self {
            models,
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Empty backend serving [`default_model_catalog`].
    pub fn with_default_catalog() -> Self {
        Self::new(default_model_catalog())
    }

    fn find_model(&self, stage: &'static str, model_name: &str) -> ApiResult<&Model> {
        self.models
            .iter()
            .find(|model| model.name == model_name)
            .with_context(|| RejectedSnafu {
                stage,
                message: format!("Model {model_name} not found"),
            })
    }
}

impl ConversationApi for MemoryBackend {
    fn list_conversations(&self) -> BoxFuture<'_, ApiResult<Vec<Conversation>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let mut active = state
                .conversations
                .iter()
                .filter(|stored| stored.is_active)
                .collect::<Vec<_>>();
            active.sort_by(|left, right| sort_by_recent_desc(left, right));

            Ok(active
                .into_iter()
                .take(LIST_LIMIT)
                .map(|stored| {
                    let mut summary = stored.record.to_summary();
                    summary.message_count = stored.record.messages.len() as u64;
                    summary
                })
                .collect())
        })
    }

    fn create_conversation(
        &self,
        input: NewConversation,
    ) -> BoxFuture<'_, ApiResult<Conversation>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.last_conversation_id = state.last_conversation_id.saturating_add(1);

            let now = state.tick();
            let record = Conversation {
                id: ConversationId::new(state.last_conversation_id),
                title: input.title,
                current_model: input.initial_model,
                message_count: 0,
                total_tokens: 0,
                estimated_cost: "0.00".to_string(),
                estimated_carbon: "0.00".to_string(),
                created_at: now,
                messages: Vec::new(),
            };
            state.conversations.push(StoredConversation {
                record: record.clone(),
                updated_at: now,
                is_active: true,
                compressed: BTreeSet::new(),
            });

            tracing::debug!(conversation_id = %record.id, "memory backend created conversation");
            Ok(record)
        })
    }

    fn get_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> BoxFuture<'_, ApiResult<Conversation>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let stored = state.find("get-conversation", conversation_id)?;
            let mut record = stored.record.clone();
            record.message_count = record.messages.len() as u64;
            Ok(record)
        })
    }

    fn send_message(
        &self,
        conversation_id: ConversationId,
        input: NewMessage,
    ) -> BoxFuture<'_, ApiResult<Message>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.find("send-message", conversation_id)?;

            let now = state.tick();
            let user_message = Message {
                id: state.next_message_id(),
                role: MessageRole::User,
                token_count: word_count(&input.content),
                content: input.content.clone(),
                model_used: USER_MODEL_LABEL.to_string(),
                cost: format_decimal(0.0),
                carbon_footprint: format_decimal(0.0),
                created_at: now,
            };

            let reply = format!("{MOCK_REPLY_PREFIX}{}", input.content);
            let assistant_message = Message {
                id: state.next_message_id(),
                role: MessageRole::Assistant,
                token_count: word_count(&reply),
                content: reply,
                model_used: input.model.clone(),
                cost: format_decimal(ASSISTANT_REPLY_COST),
                carbon_footprint: format_decimal(ASSISTANT_REPLY_CARBON),
                created_at: now,
            };

            let stored = state.find_mut("send-message", conversation_id)?;
            let record = &mut stored.record;
            record.total_tokens += user_message.token_count + assistant_message.token_count;
            record.estimated_cost =
                format_decimal(decimal_value(&record.estimated_cost) + ASSISTANT_REPLY_COST);
            record.estimated_carbon =
                format_decimal(decimal_value(&record.estimated_carbon) + ASSISTANT_REPLY_CARBON);
            record.current_model = input.model;
            record.messages.push(user_message);
            record.messages.push(assistant_message.clone());
            record.message_count = record.messages.len() as u64;
            stored.updated_at = now;

            Ok(assistant_message)
        })
    }

    fn delete_conversation(&self, conversation_id: ConversationId) -> BoxFuture<'_, ApiResult<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let stored = state.find_mut("delete-conversation", conversation_id)?;
            stored.is_active = false;
            Ok(())
        })
    }
}

impl ModelApi for MemoryBackend {
    fn list_models(&self) -> BoxFuture<'_, ApiResult<Vec<Model>>> {
        Box::pin(async move { Ok(self.models.clone()) })
    }

    fn model_info(&self, model_name: String) -> BoxFuture<'_, ApiResult<ModelInfo>> {
        Box::pin(async move {
            let model = self.find_model("model-info", &model_name)?;
            Ok(model.info.clone())
        })
    }

    fn estimate_cost(
        &self,
        model_name: String,
        messages: Vec<EstimateMessage>,
    ) -> BoxFuture<'_, ApiResult<CostEstimate>> {
        Box::pin(async move {
            let model = self.find_model("estimate-cost", &model_name)?;
            let estimated_tokens = messages
                .iter()
                .map(|message| word_count(&message.content) as f64 * TOKENS_PER_WORD)
                .sum::<f64>();
            let (cost_per_token, carbon_per_token) = per_token_rates(model);

            Ok(CostEstimate {
                model: model_name,
                estimated_cost: format!("${:.6}", estimated_tokens * cost_per_token),
                estimated_carbon_footprint: format!(
                    "{:.6}g CO2",
                    estimated_tokens * carbon_per_token
                ),
                message_count: messages.len() as u64,
            })
        })
    }
}

impl MemoryApi for MemoryBackend {
    fn conversation_summary(
        &self,
        conversation_id: ConversationId,
    ) -> BoxFuture<'_, ApiResult<ConversationSummary>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let stored = state.find("conversation-summary", conversation_id)?;
            let messages = &stored.record.messages;

            let models_used = messages
                .iter()
                .map(|message| message.model_used.clone())
                .filter(|model| !model.is_empty())
                .collect::<BTreeSet<_>>();

            Ok(ConversationSummary {
                conversation_id,
                title: stored.record.title.clone(),
                message_count: messages.len() as u64,
                total_tokens: messages.iter().map(|message| message.token_count).sum(),
                total_cost: format!(
                    "{:.4}",
                    messages
                        .iter()
                        .map(|message| decimal_value(&message.cost))
                        .sum::<f64>()
                ),
                total_carbon: format!(
                    "{:.4}",
                    messages
                        .iter()
                        .map(|message| decimal_value(&message.carbon_footprint))
                        .sum::<f64>()
                ),
                models_used: models_used.into_iter().collect(),
                created_at: stored.record.created_at,
                last_updated: Some(stored.updated_at),
            })
        })
    }

    fn search_memory(
        &self,
        request: MemorySearchRequest,
    ) -> BoxFuture<'_, ApiResult<Vec<MemorySearchHit>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let needle = request.query.trim().to_lowercase();

            let mut matches = state
                .conversations
                .iter()
                .filter(|stored| {
                    request
                        .conversation_id
                        .is_none_or(|wanted| stored.record.id == wanted)
                })
                .flat_map(|stored| {
                    stored
                        .record
                        .messages
                        .iter()
                        .map(move |message| (stored.record.id, message))
                })
                .filter(|(_, message)| message.content.to_lowercase().contains(&needle))
                .collect::<Vec<_>>();

            matches.sort_by(|(_, left), (_, right)| {
                right
                    .created_at
                    .cmp(&left.created_at)
                    .then_with(|| right.id.cmp(&left.id))
            });

            // Rank-based score: the service has no similarity model behind this endpoint yet.
            Ok(matches
                .into_iter()
                .take(request.limit as usize)
                .enumerate()
                .map(|(rank, (conversation_id, message))| MemorySearchHit {
                    message_id: message.id,
                    content: message.content.clone(),
                    role: message.role,
                    similarity_score: 1.0 - rank as f64 * 0.1,
                    created_at: message.created_at,
                    conversation_id,
                })
                .collect())
        })
    }

    fn conversation_context(
        &self,
        conversation_id: ConversationId,
        max_messages: u32,
    ) -> BoxFuture<'_, ApiResult<ConversationContext>> {
        Box::pin(async move {
            let state = self.state.read().await;
            // Unknown ids yield an empty window, as the service does.
            let Some(stored) = state
                .conversations
                .iter()
                .find(|stored| stored.record.id == conversation_id)
            else {
                return Ok(ConversationContext {
                    conversation_id,
                    context: Vec::new(),
                    message_count: 0,
                });
            };

            let mut recent = stored.record.messages.iter().collect::<Vec<_>>();
            recent.sort_by(|left, right| {
                right
                    .created_at
                    .cmp(&left.created_at)
                    .then_with(|| right.id.cmp(&left.id))
            });
            recent.truncate(max_messages as usize);
            recent.reverse();

            let context = recent
                .into_iter()
                .map(|message| ContextEntry {
                    role: message.role,
                    content: message.content.clone(),
                    metadata: ContextMetadata {
                        message_id: message.id,
                        model_used: message.model_used.clone(),
                        created_at: message.created_at,
                        is_compressed: stored.compressed.contains(&message.id),
                    },
                })
                .collect::<Vec<_>>();

            Ok(ConversationContext {
                conversation_id,
                message_count: context.len() as u64,
                context,
            })
        })
    }

    fn compress_context(
        &self,
        request: CompressRequest,
    ) -> BoxFuture<'_, ApiResult<CompressionReport>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let mut report = CompressionReport {
                conversation_id: request.conversation_id,
                total_messages: 0,
                compressed_messages: 0,
                compression_ratio: request.target_ratio,
                status: "success".to_string(),
            };

            let Some(stored) = state
                .conversations
                .iter_mut()
                .find(|stored| stored.record.id == request.conversation_id)
            else {
                return Ok(report);
            };

            let total = stored.record.messages.len();
            if total > COMPRESSION_MIN_MESSAGES {
                let middle = COMPRESSION_KEEP_EDGES..total - COMPRESSION_KEEP_EDGES;
                for message in &mut stored.record.messages[middle] {
                    if stored.compressed.insert(message.id) {
                        message.content =
                            format!("{COMPRESSED_PREFIX}{}", summarize(&message.content));
                    }
                }
            }

            report.total_messages = total as u64;
            report.compressed_messages = stored.compressed.len() as u64;
            tracing::debug!(
                conversation_id = %request.conversation_id,
                compressed = report.compressed_messages,
                "memory backend compressed context"
            );
            Ok(report)
        })
    }

    fn health(&self) -> BoxFuture<'_, ApiResult<HealthStatus>> {
        Box::pin(async move {
            Ok(HealthStatus {
                status: "healthy".to_string(),
            })
        })
    }
}

/// Catalog the service registers when every provider key is configured.
pub fn default_model_catalog() -> Vec<Model> {
    let entry = |name: &str, provider: Provider, model: &str, max_tokens: u64, functions: bool| {
        Model::new(
            name,
            ModelInfo {
                provider,
                model: model.to_string(),
                max_tokens,
                supports_functions: functions,
            },
        )
    };

    vec![
        entry("gpt-4", Provider::OpenAi, "gpt-4", 4096, true),
        entry("gpt-3.5-turbo", Provider::OpenAi, "gpt-3.5-turbo", 4096, true),
        entry(
            "claude-3-sonnet",
            Provider::Anthropic,
            "claude-3-sonnet-20240229",
            4096,
            false,
        ),
        entry(
            "claude-3-haiku",
            Provider::Anthropic,
            "claude-3-haiku-20240307",
            4096,
            false,
        ),
        entry("gemini-pro", Provider::Google, "gemini-pro", 8192, true),
        entry(
            "gemini-pro-vision",
            Provider::Google,
            "gemini-pro-vision",
            8192,
            true,
        ),
    ]
}

fn per_token_rates(model: &Model) -> (f64, f64) {
    match model.info.provider {
        Provider::OpenAi if model.info.model.contains("gpt-4") => (0.000_03, 0.000_000_5),
        Provider::OpenAi => (0.000_002, 0.000_000_5),
        Provider::Anthropic => (0.000_015, 0.000_000_3),
        Provider::Google => (0.000_001, 0.000_000_2),
        Provider::Other | Provider::Unknown => (0.0, 0.0),
    }
}

/// First characters of a long message, marked as cut.
fn summarize(content: &str) -> String {
    match content.char_indices().nth(COMPRESSED_SUMMARY_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

fn format_decimal(value: f64) -> String {
    format!("{value:?}")
}

fn sort_by_recent_desc(left: &StoredConversation, right: &StoredConversation) -> Ordering {
    right
        .updated_at
        .cmp(&left.updated_at)
        .then_with(|| right.record.id.cmp(&left.record.id))
}
