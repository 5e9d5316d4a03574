use std::fmt::{self, Display};

use chrono::{DateTime, TimeZone, Utc};
use contextlink_api::{Conversation, ConversationId, decimal_value};

const WEEKDAY_WINDOW_DAYS: i64 = 7;
const MIN_DISPLAYED_COST: f64 = 0.01;
const MIN_DISPLAYED_CARBON: f64 = 0.001;

/// One rendered entry of the conversation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRow {
    pub conversation_id: ConversationId,
    pub title: String,
    pub model: String,
    pub message_count: u64,
    pub date_label: String,
    pub cost_label: String,
    pub carbon_label: String,
    pub is_active: bool,
}

impl Display for ConversationRow {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.is_active { '>' } else { ' ' };
        write!(
            formatter,
            "{marker} #{:<4} {:<28} {:>6}  {:<16} {:>3} msgs  {:>7}  {:>8}",
            self.conversation_id.get(),
            truncate(&self.title, 28),
            self.date_label,
            truncate(&self.model, 16),
            self.message_count,
            self.cost_label,
            self.carbon_label,
        )
    }
}

/// Projects backend summaries into rows, keeping the backend order.
pub fn conversation_rows<Tz>(
    conversations: &[Conversation],
    active: Option<ConversationId>,
    now: &DateTime<Tz>,
) -> Vec<ConversationRow>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    conversations
        .iter()
        .map(|conversation| ConversationRow {
            conversation_id: conversation.id,
            title: conversation.display_title().to_string(),
            model: conversation.current_model.clone(),
            message_count: conversation.message_count,
            date_label: format_relative_date(conversation.created_at, now),
            cost_label: format_cost(&conversation.estimated_cost),
            carbon_label: format_carbon(&conversation.estimated_carbon),
            is_active: active == Some(conversation.id),
        })
        .collect()
}

/// Rows joined into a block, or the empty-state hint.
pub fn render_conversation_list(rows: &[ConversationRow]) -> String {
    if rows.is_empty() {
        return "No conversations yet. Use /new to start one.".to_string();
    }

    rows.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Short date for list rows, evaluated in the timezone of `now`.
///
/// Same calendar day renders `HH:MM`, the previous six days render the
/// weekday, anything else renders month and day.
pub fn format_relative_date<Tz>(at: DateTime<Utc>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let local = at.with_timezone(&now.timezone());
    let age_days = now
        .date_naive()
        .signed_duration_since(local.date_naive())
        .num_days();

    if age_days == 0 {
        local.format("%H:%M").to_string()
    } else if (1..WEEKDAY_WINDOW_DAYS).contains(&age_days) {
        local.format("%a").to_string()
    } else {
        local.format("%b %-d").to_string()
    }
}

/// Dollar label; sub-cent amounts render as `<$0.01`.
pub fn format_cost(raw: &str) -> String {
    let value = decimal_value(raw);
    if value > 0.0 && value < MIN_DISPLAYED_COST {
        "<$0.01".to_string()
    } else {
        format!("${value:.2}")
    }
}

pub fn format_carbon(raw: &str) -> String {
    let value = decimal_value(raw);
    if value > 0.0 && value < MIN_DISPLAYED_CARBON {
        "<0.001g".to_string()
    } else {
        format!("{value:.2}g")
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let mut truncated = text.chars().take(max_chars - 1).collect::<String>();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;

    use super::*;

    fn now() -> DateTime<FixedOffset> {
        // Tuesday 2024-03-12 15:30 at UTC+02:00.
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 12, 15, 30, 0)
            .unwrap()
    }

    fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn relative_date_uses_time_weekday_or_month_day() {
        assert_eq!(format_relative_date(utc(2024, 3, 12, 7, 5), &now()), "09:05");
        assert_eq!(format_relative_date(utc(2024, 3, 10, 12, 0), &now()), "Sun");
        assert_eq!(format_relative_date(utc(2024, 3, 5, 12, 0), &now()), "Mar 5");
    }

    #[test]
    fn relative_date_follows_timezone_of_now() {
        // 23:30 UTC on the 11th is already the 12th at UTC+02:00.
        assert_eq!(format_relative_date(utc(2024, 3, 11, 23, 30), &now()), "01:30");
    }

    #[test]
    fn cost_labels_collapse_tiny_values() {
        assert_eq!(format_cost("0.004"), "<$0.01");
        assert_eq!(format_cost("1.5"), "$1.50");
        assert_eq!(format_cost("0"), "$0.00");
        assert_eq!(format_cost("garbage"), "$0.00");
    }

    #[test]
    fn carbon_labels_collapse_tiny_values() {
        assert_eq!(format_carbon("0.0005"), "<0.001g");
        assert_eq!(format_carbon("2.1"), "2.10g");
        assert_eq!(format_carbon(""), "0.00g");
    }

    #[test]
    fn rows_mark_active_and_fall_back_to_default_title() {
        let conversation = Conversation {
            id: ConversationId::new(5),
            title: Some("  ".to_string()),
            current_model: "gpt-4".to_string(),
            message_count: 3,
            total_tokens: 12,
            estimated_cost: "0.02".to_string(),
            estimated_carbon: "0.002".to_string(),
            created_at: utc(2024, 3, 12, 8, 0),
            messages: Vec::new(),
        };

        let rows = conversation_rows(
            std::slice::from_ref(&conversation),
            Some(ConversationId::new(5)),
            &now(),
        );
        assert_eq!(rows[0].title, "New Conversation");
        assert!(rows[0].is_active);
        assert_eq!(rows[0].cost_label, "$0.02");
        assert!(render_conversation_list(&rows).starts_with("> #5"));
        assert!(render_conversation_list(&[]).starts_with("No conversations yet"));
    }
}
