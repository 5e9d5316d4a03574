use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod http;
pub mod ids;
pub mod memory;
pub mod timestamp;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use http::HttpBackend;
pub use ids::{ConversationId, MessageId};
pub use memory::MemoryBackend;
pub use types::{
    COMPRESSED_PREFIX, CarbonStats, CompressRequest, CompressionReport, ContextEntry,
    ContextMetadata, Conversation, ConversationContext, ConversationSummary, CostEstimate,
    DEFAULT_COMPRESSION_RATIO, DEFAULT_CONTEXT_WINDOW, DEFAULT_CONVERSATION_TITLE, DEFAULT_MODEL,
    EstimateMessage, HealthStatus, MemorySearchHit, MemorySearchRequest, Message, MessageRole,
    Model, ModelInfo, NewConversation, NewMessage, Provider, decimal_value,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Conversation CRUD plus message posting.
pub trait ConversationApi: Send + Sync {
    fn list_conversations(&self) -> BoxFuture<'_, ApiResult<Vec<Conversation>>>;
    fn create_conversation(&self, input: NewConversation)
    -> BoxFuture<'_, ApiResult<Conversation>>;
    fn get_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> BoxFuture<'_, ApiResult<Conversation>>;
    fn send_message(
        &self,
        conversation_id: ConversationId,
        input: NewMessage,
    ) -> BoxFuture<'_, ApiResult<Message>>;
    fn delete_conversation(&self, conversation_id: ConversationId) -> BoxFuture<'_, ApiResult<()>>;
}

/// Model catalog and per-model cost estimation.
pub trait ModelApi: Send + Sync {
    fn list_models(&self) -> BoxFuture<'_, ApiResult<Vec<Model>>>;
    fn model_info(&self, model_name: String) -> BoxFuture<'_, ApiResult<ModelInfo>>;
    fn estimate_cost(
        &self,
        model_name: String,
        messages: Vec<EstimateMessage>,
    ) -> BoxFuture<'_, ApiResult<CostEstimate>>;
}

/// Memory endpoints: summaries, search, context windows and compression.
pub trait MemoryApi: Send + Sync {
    fn conversation_summary(
        &self,
        conversation_id: ConversationId,
    ) -> BoxFuture<'_, ApiResult<ConversationSummary>>;
    fn search_memory(
        &self,
        request: MemorySearchRequest,
    ) -> BoxFuture<'_, ApiResult<Vec<MemorySearchHit>>>;
    /// Last `max_messages` messages of a conversation, oldest first.
    fn conversation_context(
        &self,
        conversation_id: ConversationId,
        max_messages: u32,
    ) -> BoxFuture<'_, ApiResult<ConversationContext>>;
    /// Rewrites the middle of a long thread into truncated `[COMPRESSED]` entries.
    fn compress_context(
        &self,
        request: CompressRequest,
    ) -> BoxFuture<'_, ApiResult<CompressionReport>>;
    fn health(&self) -> BoxFuture<'_, ApiResult<HealthStatus>>;
}

/// Full backend surface consumed by the chat client.
pub trait ChatBackend: ConversationApi + ModelApi + MemoryApi {}

impl<T> ChatBackend for T where T: ConversationApi + ModelApi + MemoryApi {}
