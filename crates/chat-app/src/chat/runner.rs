use std::sync::Arc;

use contextlink_api::{ApiResult, BoxFuture, ChatBackend};

use crate::chat::events::{Effect, Outcome};

/// Executes effects against a backend and reports them back as outcomes.
///
/// This is the only place in the client that touches the network.
#[derive(Clone)]
pub struct EffectRunner {
    backend: Arc<dyn ChatBackend>,
}

impl EffectRunner {
    /// Runner sharing `backend` with every effect it spawns.
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Returns an owned future so callers can keep several effects in flight.
    pub fn run(&self, effect: Effect) -> BoxFuture<'static, Outcome> {
        let backend = Arc::clone(&self.backend);
        Box::pin(async move {
            let name = effect.name();
            tracing::debug!(effect = name, "running effect");
            let result = perform(backend.as_ref(), effect.clone()).await;
            match result {
                Ok(outcome) => outcome,
                Err(error) => Outcome::Failed { effect, error },
            }
        })
    }
}

async fn perform(backend: &dyn ChatBackend, effect: Effect) -> ApiResult<Outcome> {
    let outcome = match effect {
        Effect::FetchModels => Outcome::ModelsLoaded(backend.list_models().await?),
        Effect::FetchConversations => {
            Outcome::ConversationsLoaded(backend.list_conversations().await?)
        }
        Effect::CreateConversation(input) => {
            Outcome::ConversationCreated(backend.create_conversation(input).await?)
        }
        Effect::FetchConversation(conversation_id) => {
            Outcome::ConversationLoaded(backend.get_conversation(conversation_id).await?)
        }
        Effect::PostMessage {
            conversation_id,
            message,
        } => Outcome::MessagePosted {
            conversation_id,
            message: backend.send_message(conversation_id, message).await?,
        },
        Effect::DeleteConversation(conversation_id) => {
            backend.delete_conversation(conversation_id).await?;
            Outcome::ConversationDeleted(conversation_id)
        }
        Effect::FetchModelInfo { model_name } => {
            let info = backend.model_info(model_name.clone()).await?;
            Outcome::ModelInfoLoaded { model_name, info }
        }
        Effect::EstimateCost {
            model_name,
            messages,
        } => Outcome::CostEstimated(backend.estimate_cost(model_name, messages).await?),
        Effect::FetchSummary(conversation_id) => {
            Outcome::SummaryLoaded(backend.conversation_summary(conversation_id).await?)
        }
        Effect::SearchMemory(request) => {
            let query = request.query.clone();
            let hits = backend.search_memory(request).await?;
            Outcome::MemorySearched { query, hits }
        }
        Effect::FetchContext {
            conversation_id,
            max_messages,
        } => Outcome::ContextLoaded(
            backend
                .conversation_context(conversation_id, max_messages)
                .await?,
        ),
        Effect::CompressContext(request) => {
            Outcome::ContextCompressed(backend.compress_context(request).await?)
        }
        Effect::CheckHealth => Outcome::HealthChecked(backend.health().await?),
    };
    Ok(outcome)
}
