//! Interaction audit trail.
//!
//! Every message and button press lands in the `logs` table. Recording is
//! best-effort: a failed insert is logged and swallowed so the audit trail
//! can never break the conversation it is observing.

use sqlx::SqlitePool;
use teloxide::types::{CallbackQuery, InlineKeyboardButtonKind};
use tracing::warn;

use crate::db;

/// How the user produced the input being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Text,
    Command,
    ReplyButton,
    InlineButton,
}

impl InteractionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InteractionKind::Text => "text",
            InteractionKind::Command => "command",
            InteractionKind::ReplyButton => "reply_button",
            InteractionKind::InlineButton => "inline_button",
        }
    }
}

/// Append one entry to the audit trail. Never fails.
pub async fn record(pool: &SqlitePool, user_id: i64, kind: InteractionKind, content: &str) {
    if let Err(e) = db::create_log(pool, user_id, kind.as_str(), content).await {
        warn!(user_id, kind = kind.as_str(), error = %e, "failed to record interaction");
    }
}

/// Resolve the human-readable label of the inline button behind a callback
/// query by scanning the live keyboard on the originating message for the
/// button carrying the query's token.
///
/// Falls back to `None` when the message is inaccessible or the keyboard
/// was edited away; the caller records the raw token instead.
pub fn pressed_button_label(q: &CallbackQuery) -> Option<String> {
    let data = q.data.as_deref()?;
    let markup = q.message.as_ref()?.regular_message()?.reply_markup()?;
    for row in &markup.inline_keyboard {
        for button in row {
            if let InlineKeyboardButtonKind::CallbackData(token) = &button.kind {
                if token == data {
                    return Some(button.text.clone());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_appends_entry() {
        let pool = db::connect_with_pool_size("sqlite::memory:", 1).await.unwrap();
        db::init_schema(&pool).await.unwrap();
        db::create_user(&pool, 42, Some("bob"), None, None).await.unwrap();

        record(&pool, 42, InteractionKind::InlineButton, "New order").await;
        record(&pool, 42, InteractionKind::Text, "hello").await;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM logs WHERE user_id = 42")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(InteractionKind::Text.as_str(), "text");
        assert_eq!(InteractionKind::Command.as_str(), "command");
        assert_eq!(InteractionKind::ReplyButton.as_str(), "reply_button");
        assert_eq!(InteractionKind::InlineButton.as_str(), "inline_button");
    }
}
