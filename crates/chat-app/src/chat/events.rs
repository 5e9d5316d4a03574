use contextlink_api::{
    ApiError, CompressRequest, CompressionReport, Conversation, ConversationContext,
    ConversationId, ConversationSummary, CostEstimate, EstimateMessage, HealthStatus,
    MemorySearchHit, MemorySearchRequest, Message, Model, ModelInfo, NewConversation, NewMessage,
};

/// User intent fed into [`ChatStore::dispatch`](crate::chat::ChatStore::dispatch).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Initialize,
    CreateConversation { initial_model: String },
    SelectConversation(ConversationId),
    SendMessage { content: String },
    SelectModel(String),
    DeleteConversation(ConversationId),
    RefreshConversations,
    InspectModel { model_name: String },
    EstimateCost,
    SummarizeConversation,
    SearchMemory { query: String },
    /// Show the trailing context window; `0` means the backend default.
    ShowContext { max_messages: u32 },
    CompressContext,
    CheckHealth,
}

/// I/O requested by the store; only the effect runner performs it.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchModels,
    FetchConversations,
    CreateConversation(NewConversation),
    FetchConversation(ConversationId),
    PostMessage {
        conversation_id: ConversationId,
        message: NewMessage,
    },
    DeleteConversation(ConversationId),
    FetchModelInfo {
        model_name: String,
    },
    EstimateCost {
        model_name: String,
        messages: Vec<EstimateMessage>,
    },
    FetchSummary(ConversationId),
    SearchMemory(MemorySearchRequest),
    FetchContext {
        conversation_id: ConversationId,
        max_messages: u32,
    },
    CompressContext(CompressRequest),
    CheckHealth,
}

impl Effect {
    /// Short label used in logs and failure diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FetchModels => "fetch-models",
            Self::FetchConversations => "fetch-conversations",
            Self::CreateConversation(_) => "create-conversation",
            Self::FetchConversation(_) => "fetch-conversation",
            Self::PostMessage { .. } => "post-message",
            Self::DeleteConversation(_) => "delete-conversation",
            Self::FetchModelInfo { .. } => "fetch-model-info",
            Self::EstimateCost { .. } => "estimate-cost",
            Self::FetchSummary(_) => "fetch-summary",
            Self::SearchMemory(_) => "search-memory",
            Self::FetchContext { .. } => "fetch-context",
            Self::CompressContext(_) => "compress-context",
            Self::CheckHealth => "check-health",
        }
    }
}

/// Completed effect handed back to [`ChatStore::apply`](crate::chat::ChatStore::apply).
#[derive(Debug)]
pub enum Outcome {
    ModelsLoaded(Vec<Model>),
    ConversationsLoaded(Vec<Conversation>),
    ConversationCreated(Conversation),
    ConversationLoaded(Conversation),
    MessagePosted {
        conversation_id: ConversationId,
        message: Message,
    },
    ConversationDeleted(ConversationId),
    ModelInfoLoaded {
        model_name: String,
        info: ModelInfo,
    },
    CostEstimated(CostEstimate),
    SummaryLoaded(ConversationSummary),
    MemorySearched {
        query: String,
        hits: Vec<MemorySearchHit>,
    },
    ContextLoaded(ConversationContext),
    ContextCompressed(CompressionReport),
    HealthChecked(HealthStatus),
    Failed {
        effect: Effect,
        error: ApiError,
    },
}

impl Outcome {
    /// Whether the effect behind this outcome failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
