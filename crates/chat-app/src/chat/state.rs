use contextlink_api::{
    CompressRequest, CompressionReport, Conversation, ConversationContext, ConversationId,
    ConversationSummary, CostEstimate, DEFAULT_CONTEXT_WINDOW, EstimateMessage, HealthStatus,
    MemorySearchHit, MemorySearchRequest, Model, ModelInfo, NewConversation, NewMessage,
};

use crate::chat::composer::{Composer, ComposerRejection};
use crate::chat::events::{Command, Effect, Outcome};

/// Hits requested per memory search.
pub const MEMORY_SEARCH_LIMIT: u32 = 5;

/// Which of the two main views the shell shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainView {
    NoConversation,
    HasConversation(ConversationId),
}

/// Why a command produced no effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandRejection {
    EmptyDraft,
    AlreadySending { conversation_id: ConversationId },
    NoActiveConversation,
    EmptyQuery,
}

impl From<ComposerRejection> for CommandRejection {
    fn from(value: ComposerRejection) -> Self {
        match value {
            ComposerRejection::EmptyDraft => Self::EmptyDraft,
            ComposerRejection::AlreadySending { conversation_id } => {
                Self::AlreadySending { conversation_id }
            }
        }
    }
}

/// Latest answer from one of the inspection endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum Insight {
    ModelInfo { model_name: String, info: ModelInfo },
    CostEstimate(CostEstimate),
    Summary(ConversationSummary),
    Search {
        query: String,
        hits: Vec<MemorySearchHit>,
    },
    Context(ConversationContext),
    Compression(CompressionReport),
}

/// Single owner of the client state.
///
/// `dispatch` turns intents into effects and `apply` folds completed effects
/// back in. Neither performs I/O.
#[derive(Debug, Default)]
pub struct ChatStore {
    models: Vec<Model>,
    conversations: Vec<Conversation>,
    active: Option<Conversation>,
    selected_model: String,
    composer: Composer,
    insight: Option<Insight>,
    backend_status: Option<HealthStatus>,
    last_rejection: Option<CommandRejection>,
    last_failure: Option<String>,
}

impl ChatStore {
    /// Empty store with `selected_model` preselected.
    pub fn new(selected_model: impl Into<String>) -> Self {
        Self {
            selected_model: selected_model.into(),
            ..Self::default()
        }
    }

    /// Model catalog from the last successful fetch.
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Conversation summaries, most recent first.
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Fully loaded conversation shown in the thread view.
    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active.as_ref()
    }

    pub fn active_conversation_id(&self) -> Option<ConversationId> {
        self.active.as_ref().map(|conversation| conversation.id)
    }

    pub fn main_view(&self) -> MainView {
        match self.active_conversation_id() {
            Some(conversation_id) => MainView::HasConversation(conversation_id),
            None => MainView::NoConversation,
        }
    }

    /// Model used for new messages and cost estimates.
    pub fn selected_model(&self) -> &str {
        &self.selected_model
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Most recent answer from an inspection command.
    pub fn insight(&self) -> Option<&Insight> {
        self.insight.as_ref()
    }

    /// Status from the last health check, if one completed.
    pub fn backend_status(&self) -> Option<&HealthStatus> {
        self.backend_status.as_ref()
    }

    /// Reason the most recent dispatch was refused, if it was.
    pub fn last_rejection(&self) -> Option<CommandRejection> {
        self.last_rejection
    }

    /// Diagnostic text of the most recent failed effect.
    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// Turns an intent into the effects it needs. Rejections return no effects.
    pub fn dispatch(&mut self, command: Command) -> Vec<Effect> {
        self.last_rejection = None;

        match command {
            Command::Initialize => vec![Effect::FetchModels, Effect::FetchConversations],
            Command::RefreshConversations => vec![Effect::FetchConversations],
            Command::CreateConversation { initial_model } => {
                let initial_model = non_empty_or(initial_model, &self.selected_model);
                vec![Effect::CreateConversation(NewConversation::new(
                    initial_model,
                ))]
            }
            // No cache check: re-selecting the active conversation fetches it again.
            Command::SelectConversation(conversation_id) => {
                vec![Effect::FetchConversation(conversation_id)]
            }
            Command::SendMessage { content } => self.submit(content),
            Command::SelectModel(model_name) => {
                let model_name = model_name.trim();
                if !model_name.is_empty() {
                    tracing::info!(model = model_name, "selected model");
                    self.selected_model = model_name.to_string();
                }
                Vec::new()
            }
            Command::DeleteConversation(conversation_id) => {
                vec![Effect::DeleteConversation(conversation_id)]
            }
            Command::InspectModel { model_name } => {
                let model_name = non_empty_or(model_name, &self.selected_model);
                vec![Effect::FetchModelInfo { model_name }]
            }
            Command::EstimateCost => {
                let Some(conversation) = self.active.as_ref() else {
                    return self.reject(CommandRejection::NoActiveConversation);
                };
                let messages = conversation
                    .messages
                    .iter()
                    .map(|message| EstimateMessage {
                        role: message.role,
                        content: message.content.clone(),
                    })
                    .collect();
                vec![Effect::EstimateCost {
                    model_name: self.selected_model.clone(),
                    messages,
                }]
            }
            Command::SummarizeConversation => match self.active_conversation_id() {
                Some(conversation_id) => vec![Effect::FetchSummary(conversation_id)],
                None => self.reject(CommandRejection::NoActiveConversation),
            },
            Command::SearchMemory { query } => {
                let query = query.trim();
                if query.is_empty() {
                    return self.reject(CommandRejection::EmptyQuery);
                }
                vec![Effect::SearchMemory(MemorySearchRequest {
                    query: query.to_string(),
                    conversation_id: None,
                    limit: MEMORY_SEARCH_LIMIT,
                })]
            }
            Command::ShowContext { max_messages } => match self.active_conversation_id() {
                Some(conversation_id) => vec![Effect::FetchContext {
                    conversation_id,
                    max_messages: if max_messages == 0 {
                        DEFAULT_CONTEXT_WINDOW
                    } else {
                        max_messages
                    },
                }],
                None => self.reject(CommandRejection::NoActiveConversation),
            },
            Command::CompressContext => match self.active_conversation_id() {
                Some(conversation_id) => {
                    vec![Effect::CompressContext(CompressRequest::new(conversation_id))]
                }
                None => self.reject(CommandRejection::NoActiveConversation),
            },
            Command::CheckHealth => vec![Effect::CheckHealth],
        }
    }

    /// Folds a completed effect into the state.
    pub fn apply(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::ModelsLoaded(models) => self.models = models,
            Outcome::ConversationsLoaded(conversations) => self.conversations = conversations,
            Outcome::ConversationCreated(conversation) => {
                self.conversations
                    .retain(|summary| summary.id != conversation.id);
                self.conversations.insert(0, conversation.to_summary());
                self.active = Some(conversation);
            }
            Outcome::ConversationLoaded(conversation) => self.active = Some(conversation),
            Outcome::MessagePosted {
                conversation_id,
                message,
            } => {
                self.composer.settle(true);
                let Some(active) = self
                    .active
                    .as_mut()
                    .filter(|active| active.id == conversation_id)
                else {
                    tracing::debug!(%conversation_id, "reply arrived for an inactive conversation");
                    return;
                };

                // A re-select that landed first may already carry this reply.
                if active.messages.iter().any(|existing| existing.id == message.id) {
                    tracing::debug!(
                        %conversation_id,
                        message_id = %message.id,
                        "reply already present in the active thread"
                    );
                } else {
                    active.append_message(message);
                }
                let summary = active.to_summary();
                self.conversations
                    .retain(|existing| existing.id != conversation_id);
                self.conversations.insert(0, summary);
            }
            Outcome::ConversationDeleted(conversation_id) => {
                self.conversations
                    .retain(|summary| summary.id != conversation_id);
                if self.active_conversation_id() == Some(conversation_id) {
                    self.active = None;
                }
            }
            Outcome::ModelInfoLoaded { model_name, info } => {
                self.insight = Some(Insight::ModelInfo { model_name, info });
            }
            Outcome::CostEstimated(estimate) => {
                self.insight = Some(Insight::CostEstimate(estimate));
            }
            Outcome::SummaryLoaded(summary) => self.insight = Some(Insight::Summary(summary)),
            Outcome::MemorySearched { query, hits } => {
                self.insight = Some(Insight::Search { query, hits });
            }
            Outcome::ContextLoaded(context) => self.insight = Some(Insight::Context(context)),
            Outcome::ContextCompressed(report) => {
                self.insight = Some(Insight::Compression(report));
            }
            Outcome::HealthChecked(status) => self.backend_status = Some(status),
            Outcome::Failed { effect, error } => {
                tracing::error!(
                    effect = effect.name(),
                    stage = error.stage(),
                    "backend request failed: {error}"
                );
                if matches!(effect, Effect::PostMessage { .. }) {
                    self.composer.settle(false);
                }
                self.last_failure = Some(format!("{}: {error}", effect.name()));
            }
        }
    }

    fn submit(&mut self, content: String) -> Vec<Effect> {
        if content.trim().is_empty() {
            return self.reject(CommandRejection::EmptyDraft);
        }
        let Some(conversation_id) = self.active_conversation_id() else {
            return self.reject(CommandRejection::NoActiveConversation);
        };

        let submitted = self
            .composer
            .set_draft(content)
            .and_then(|()| self.composer.begin_submit(conversation_id));

        match submitted {
            Ok(content) => vec![Effect::PostMessage {
                conversation_id,
                message: NewMessage::new(content, self.selected_model.clone()),
            }],
            Err(rejection) => self.reject(rejection.into()),
        }
    }

    fn reject(&mut self, rejection: CommandRejection) -> Vec<Effect> {
        tracing::debug!(?rejection, "command rejected");
        self.last_rejection = Some(rejection);
        Vec::new()
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use contextlink_api::{ApiError, Message, MessageId, MessageRole};

    use super::*;
    use crate::chat::composer::ComposerState;

    fn conversation(id: u64, messages: Vec<Message>) -> Conversation {
        let mut conversation = Conversation {
            id: ConversationId::new(id),
            title: None,
            current_model: "gpt-4".to_string(),
            message_count: 0,
            total_tokens: 0,
            estimated_cost: "0.00".to_string(),
            estimated_carbon: "0.00".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap(),
            messages,
        };
        conversation.recompute_totals();
        conversation
    }

    fn reply(id: u64, content: &str, tokens: u64) -> Message {
        Message {
            id: MessageId::new(id),
            role: MessageRole::Assistant,
            content: content.to_string(),
            model_used: "gpt-4".to_string(),
            token_count: tokens,
            cost: "0.01".to_string(),
            carbon_footprint: "0.001".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 5, 9, 1, 0).unwrap(),
        }
    }

    fn store_with_active(id: u64) -> ChatStore {
        let mut store = ChatStore::new("gpt-4");
        store.apply(Outcome::ConversationCreated(conversation(id, Vec::new())));
        store
    }

    #[test]
    fn initialize_requests_models_and_conversations() {
        let mut store = ChatStore::new("gpt-4");
        assert_eq!(
            store.dispatch(Command::Initialize),
            vec![Effect::FetchModels, Effect::FetchConversations]
        );
        assert_eq!(store.main_view(), MainView::NoConversation);
    }

    #[test]
    fn created_conversation_is_prepended_and_activated() {
        let mut store = ChatStore::new("gpt-4");
        store.apply(Outcome::ConversationsLoaded(vec![conversation(1, Vec::new())]));

        let effects = store.dispatch(Command::CreateConversation {
            initial_model: " ".to_string(),
        });
        assert_eq!(
            effects,
            vec![Effect::CreateConversation(NewConversation::new("gpt-4"))]
        );

        store.apply(Outcome::ConversationCreated(conversation(2, Vec::new())));
        assert_eq!(store.conversations()[0].id, ConversationId::new(2));
        assert_eq!(store.conversations().len(), 2);
        assert_eq!(
            store.main_view(),
            MainView::HasConversation(ConversationId::new(2))
        );
    }

    #[test]
    fn whitespace_send_issues_no_effect_and_keeps_state() {
        let mut store = store_with_active(1);
        let before = store.active_conversation().cloned();

        assert!(
            store
                .dispatch(Command::SendMessage {
                    content: "  \n ".to_string()
                })
                .is_empty()
        );
        assert_eq!(store.last_rejection(), Some(CommandRejection::EmptyDraft));
        assert_eq!(store.active_conversation().cloned(), before);
        assert_eq!(store.composer().state(), ComposerState::Idle);
        assert_eq!(store.composer().draft(), "");
    }

    #[test]
    fn send_without_active_conversation_is_rejected() {
        let mut store = ChatStore::new("gpt-4");
        assert!(
            store
                .dispatch(Command::SendMessage {
                    content: "hi".to_string()
                })
                .is_empty()
        );
        assert_eq!(
            store.last_rejection(),
            Some(CommandRejection::NoActiveConversation)
        );
    }

    #[test]
    fn double_submit_is_rejected_until_settled() {
        let mut store = store_with_active(1);
        let first = store.dispatch(Command::SendMessage {
            content: "hello".to_string(),
        });
        assert_eq!(
            first,
            vec![Effect::PostMessage {
                conversation_id: ConversationId::new(1),
                message: NewMessage::new("hello", "gpt-4"),
            }]
        );

        let second = store.dispatch(Command::SendMessage {
            content: "again".to_string(),
        });
        assert!(second.is_empty());
        assert_eq!(
            store.last_rejection(),
            Some(CommandRejection::AlreadySending {
                conversation_id: ConversationId::new(1)
            })
        );
        assert_eq!(store.composer().draft(), "hello");

        store.apply(Outcome::MessagePosted {
            conversation_id: ConversationId::new(1),
            message: reply(10, "Mock response to: hello", 4),
        });
        assert!(store.composer().is_enabled());
        assert!(store.composer().draft().is_empty());
    }

    #[test]
    fn posted_reply_keeps_totals_derived_and_refreshes_summary() {
        let mut store = store_with_active(1);
        store.apply(Outcome::ConversationsLoaded(vec![
            conversation(7, Vec::new()),
            conversation(1, Vec::new()),
        ]));
        store.dispatch(Command::SendMessage {
            content: "hello".to_string(),
        });
        store.apply(Outcome::MessagePosted {
            conversation_id: ConversationId::new(1),
            message: reply(10, "Mock response to: hello", 4),
        });

        let active = store.active_conversation().unwrap();
        assert_eq!(active.message_count, active.messages.len() as u64);
        assert_eq!(active.message_count, 1);
        assert_eq!(active.total_tokens, 4);
        assert_eq!(store.conversations()[0].id, ConversationId::new(1));
        assert_eq!(store.conversations()[0].message_count, 1);
        assert!(store.conversations()[0].messages.is_empty());
    }

    #[test]
    fn failed_send_settles_composer_and_keeps_conversation() {
        let mut store = store_with_active(1);
        let effect = store
            .dispatch(Command::SendMessage {
                content: "hello".to_string(),
            })
            .remove(0);

        store.apply(Outcome::Failed {
            effect,
            error: ApiError::Status {
                stage: "send-message",
                url: "http://localhost:8000/api/v1/conversations/1/messages".to_string(),
                status: 500,
                body: "boom".to_string(),
            },
        });

        assert!(store.composer().is_enabled());
        assert_eq!(store.composer().draft(), "hello");
        assert!(store.active_conversation().unwrap().messages.is_empty());
        assert!(store.last_failure().unwrap().starts_with("post-message"));
    }

    #[test]
    fn selecting_replaces_active_conversation_wholesale() {
        let mut store = store_with_active(1);
        store.apply(Outcome::ConversationLoaded(conversation(
            1,
            vec![reply(1, "first", 2), reply(2, "second", 3)],
        )));

        assert_eq!(
            store.dispatch(Command::SelectConversation(ConversationId::new(1))),
            vec![Effect::FetchConversation(ConversationId::new(1))]
        );

        let replacement = conversation(1, vec![reply(3, "only", 1)]);
        store.apply(Outcome::ConversationLoaded(replacement.clone()));
        assert_eq!(store.active_conversation(), Some(&replacement));
    }

    #[test]
    fn reply_for_other_conversation_is_not_appended() {
        let mut store = store_with_active(1);
        store.dispatch(Command::SendMessage {
            content: "hello".to_string(),
        });
        store.apply(Outcome::ConversationLoaded(conversation(2, Vec::new())));
        store.apply(Outcome::MessagePosted {
            conversation_id: ConversationId::new(1),
            message: reply(10, "late", 1),
        });

        assert!(store.active_conversation().unwrap().messages.is_empty());
        assert!(store.composer().is_enabled());
    }

    #[test]
    fn reply_already_loaded_by_reselect_is_not_appended_twice() {
        let mut store = store_with_active(1);
        store.dispatch(Command::SendMessage {
            content: "hello".to_string(),
        });
        store.dispatch(Command::SelectConversation(ConversationId::new(1)));
        store.apply(Outcome::ConversationLoaded(conversation(
            1,
            vec![reply(2, "Mock response to: hello", 4)],
        )));

        store.apply(Outcome::MessagePosted {
            conversation_id: ConversationId::new(1),
            message: reply(2, "Mock response to: hello", 4),
        });

        let active = store.active_conversation().unwrap();
        let ids = active
            .messages
            .iter()
            .map(|message| message.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![MessageId::new(2)]);
        assert_eq!(active.message_count, 1);
        assert_eq!(active.total_tokens, 4);
        assert!(store.composer().is_enabled());
        assert!(store.composer().draft().is_empty());
    }

    #[test]
    fn context_and_compression_target_the_active_conversation() {
        let mut store = ChatStore::new("gpt-4");
        assert!(store.dispatch(Command::CompressContext).is_empty());
        assert!(
            store
                .dispatch(Command::ShowContext { max_messages: 3 })
                .is_empty()
        );
        assert_eq!(
            store.last_rejection(),
            Some(CommandRejection::NoActiveConversation)
        );

        store.apply(Outcome::ConversationCreated(conversation(6, Vec::new())));
        assert_eq!(
            store.dispatch(Command::ShowContext { max_messages: 0 }),
            vec![Effect::FetchContext {
                conversation_id: ConversationId::new(6),
                max_messages: DEFAULT_CONTEXT_WINDOW,
            }]
        );
        assert_eq!(
            store.dispatch(Command::CompressContext),
            vec![Effect::CompressContext(CompressRequest::new(
                ConversationId::new(6)
            ))]
        );

        let report = CompressionReport {
            conversation_id: ConversationId::new(6),
            total_messages: 8,
            compressed_messages: 4,
            compression_ratio: 0.3,
            status: "success".to_string(),
        };
        store.apply(Outcome::ContextCompressed(report.clone()));
        assert_eq!(store.insight(), Some(&Insight::Compression(report)));
    }

    #[test]
    fn late_list_fetch_replaces_list_but_keeps_active_conversation() {
        let mut store = ChatStore::new("gpt-4");
        store.dispatch(Command::Initialize);
        store.apply(Outcome::ConversationCreated(conversation(3, Vec::new())));

        store.apply(Outcome::ConversationsLoaded(vec![conversation(1, Vec::new())]));

        let listed = store
            .conversations()
            .iter()
            .map(|summary| summary.id)
            .collect::<Vec<_>>();
        assert_eq!(listed, vec![ConversationId::new(1)]);
        assert_eq!(
            store.main_view(),
            MainView::HasConversation(ConversationId::new(3))
        );
    }

    #[test]
    fn deleting_active_conversation_returns_to_empty_view() {
        let mut store = store_with_active(4);
        store.apply(Outcome::ConversationDeleted(ConversationId::new(4)));

        assert_eq!(store.main_view(), MainView::NoConversation);
        assert!(store.conversations().is_empty());
    }

    #[test]
    fn select_model_accepts_free_text_and_ignores_blank() {
        let mut store = ChatStore::new("gpt-4");
        assert!(store.dispatch(Command::SelectModel("my-model".to_string())).is_empty());
        assert_eq!(store.selected_model(), "my-model");

        store.dispatch(Command::SelectModel("  ".to_string()));
        assert_eq!(store.selected_model(), "my-model");
    }

    #[test]
    fn inspection_commands_need_their_inputs() {
        let mut store = ChatStore::new("gpt-4");
        assert!(store.dispatch(Command::SummarizeConversation).is_empty());
        assert!(store.dispatch(Command::EstimateCost).is_empty());
        assert!(
            store
                .dispatch(Command::SearchMemory {
                    query: " ".to_string()
                })
                .is_empty()
        );
        assert_eq!(store.last_rejection(), Some(CommandRejection::EmptyQuery));

        assert_eq!(
            store.dispatch(Command::InspectModel {
                model_name: String::new()
            }),
            vec![Effect::FetchModelInfo {
                model_name: "gpt-4".to_string()
            }]
        );
    }
}
