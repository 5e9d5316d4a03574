use contextlink_api::{Conversation, Message, MessageRole};

use crate::chat::composer::{Composer, ComposerState};
use crate::chat::sidebar::{format_carbon, format_cost};
use crate::chat::state::Insight;
use crate::model_selector::provider_style;

const EMPTY_VIEW_HINT: &str = "Select a conversation with /open <id> or start one with /new.";
const EMPTY_THREAD_HINT: &str = "No messages yet. Type your message...";

/// Placeholder shown while no conversation is active.
pub fn render_empty_view() -> String {
    EMPTY_VIEW_HINT.to_string()
}

/// Header plus every message in chronological order.
pub fn render_thread(conversation: &Conversation) -> String {
    let mut lines = vec![
        format!(
            "== {} (#{}) ==",
            conversation.display_title(),
            conversation.id
        ),
        format!(
            "model {} · {} messages · {} tokens · {} · {}",
            conversation.current_model,
            conversation.message_count,
            conversation.total_tokens,
            format_cost(&conversation.estimated_cost),
            format_carbon(&conversation.estimated_carbon),
        ),
    ];

    if conversation.messages.is_empty() {
        lines.push(EMPTY_THREAD_HINT.to_string());
    }

    for message in &conversation.messages {
        lines.push(String::new());
        lines.push(message_header(message));
        lines.extend(message.content.lines().map(|line| format!("  {line}")));
    }

    lines.join("\n")
}

/// Header line plus indented content of one message.
pub fn render_message(message: &Message) -> String {
    let mut rendered = message_header(message);
    for line in message.content.lines() {
        rendered.push_str("\n  ");
        rendered.push_str(line);
    }
    rendered
}

/// One block describing the latest inspection answer.
pub fn render_insight(insight: &Insight) -> String {
    match insight {
        Insight::ModelInfo { model_name, info } => format!(
            "{} {model_name}: provider {}, model {}, max {} tokens, functions {}",
            provider_style(info.provider).icon,
            info.provider.as_str(),
            info.model,
            info.max_tokens,
            if info.supports_functions { "yes" } else { "no" },
        ),
        Insight::CostEstimate(estimate) => format!(
            "{}: {} · {} for {} messages",
            estimate.model,
            estimate.estimated_cost,
            estimate.estimated_carbon_footprint,
            estimate.message_count,
        ),
        Insight::Summary(summary) => {
            let models = if summary.models_used.is_empty() {
                "none".to_string()
            } else {
                summary.models_used.join(", ")
            };
            format!(
                "Summary of #{}: {} messages · {} tokens · {} · {}\nmodels used: {models}",
                summary.conversation_id,
                summary.message_count,
                summary.total_tokens,
                format_cost(&summary.total_cost),
                format_carbon(&summary.total_carbon),
            )
        }
        Insight::Search { query, hits } if hits.is_empty() => {
            format!("No messages match \"{query}\".")
        }
        Insight::Search { query, hits } => {
            let mut lines = vec![format!("Matches for \"{query}\":")];
            lines.extend(hits.iter().map(|hit| {
                format!(
                    "  {:.1}  #{} {}: {}",
                    hit.similarity_score,
                    hit.conversation_id,
                    role_label(hit.role),
                    hit.content.lines().next().unwrap_or_default(),
                )
            }));
            lines.join("\n")
        }
        Insight::Context(context) if context.context.is_empty() => {
            format!("No context stored for #{}.", context.conversation_id)
        }
        Insight::Context(context) => {
            let mut lines = vec![format!(
                "Context for #{} ({} messages):",
                context.conversation_id, context.message_count
            )];
            lines.extend(context.context.iter().map(|entry| {
                let marker = if entry.metadata.is_compressed {
                    " [compressed]"
                } else {
                    ""
                };
                format!(
                    "  {}{marker}: {}",
                    role_label(entry.role),
                    entry.content.lines().next().unwrap_or_default(),
                )
            }));
            lines.join("\n")
        }
        Insight::Compression(report) => format!(
            "Compressed #{}: {} of {} messages compressed (target ratio {}), {}",
            report.conversation_id,
            report.compressed_messages,
            report.total_messages,
            report.compression_ratio,
            report.status,
        ),
    }
}

/// Prompt prefix reflecting whether input is accepted.
pub fn composer_prompt(composer: &Composer) -> &'static str {
    match composer.state() {
        ComposerState::Idle => "> ",
        ComposerState::Sending { .. } => "(sending…) ",
    }
}

fn message_header(message: &Message) -> String {
    let mut parts = vec![role_label(message.role).to_string()];
    if !message.model_used.is_empty() {
        parts.push(message.model_used.clone());
    }
    parts.push(format!("{} tokens", message.token_count));
    parts.push(format_cost(&message.cost));
    parts.join(" · ")
}

fn role_label(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "you",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    }
}
