//! Inbound message handling: commands, the reply-keyboard menu, and text
//! routed into the active order flow.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use teloxide::prelude::*;
use teloxide::types::ReplyMarkup;
use tracing::{debug, error};

use crate::audit::{self, InteractionKind};
use crate::config::Config;
use crate::flow::{self, FlowState};
use crate::registry::{self, UserGate};
use crate::{db, outbound, texts};

use super::{render_step, ui};

/// Dispatcher entry point. Handler failures are reported to the admin
/// chats and swallowed so the dispatcher never re-delivers an update.
pub async fn handle(
    bot: Bot,
    msg: Message,
    pool: SqlitePool,
    cfg: Arc<Config>,
    gate: UserGate,
) -> Result<()> {
    if let Err(e) = handle_inner(&bot, &msg, &pool, &cfg, &gate).await {
        error!(chat_id = msg.chat.id.0, error = %e, "message handler failed");
        outbound::report_failure(
            &bot,
            &cfg.admin_chat_ids,
            "message handler failed",
            &format!("{e:#}"),
        )
        .await;
    }
    Ok(())
}

async fn handle_inner(
    bot: &Bot,
    msg: &Message,
    pool: &SqlitePool,
    cfg: &Config,
    gate: &UserGate,
) -> Result<()> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    if from.is_bot {
        return Ok(());
    }
    let user_id = from.id.0 as i64;

    // One update per user at a time; closes the read-modify-write race on
    // conversation state.
    let _guard = gate.acquire(user_id).await;

    let Some(user) = registry::resolve(
        pool,
        user_id,
        from.username.as_deref(),
        Some(&from.first_name),
        from.last_name.as_deref(),
    )
    .await?
    else {
        return Ok(());
    };

    // Media echo: reply with the file id so posts can be composed from
    // forwarded media.
    if let Some(file_id) = media_file_id(msg) {
        audit::record(pool, user_id, InteractionKind::Text, "[media]").await;
        outbound::send_text(bot, msg.chat.id, &texts::media_echo(&file_id), None).await?;
        return Ok(());
    }

    let Some(text) = msg.text() else {
        debug!(user_id, "ignoring unsupported message content");
        return Ok(());
    };

    match text {
        "/start" => {
            audit::record(pool, user_id, InteractionKind::Command, text).await;
            flow::reset(pool, user_id).await?;
            outbound::send_text(
                bot,
                msg.chat.id,
                texts::WELCOME,
                Some(ReplyMarkup::Keyboard(ui::main_menu())),
            )
            .await?;
        }
        texts::BTN_ORDERS => {
            audit::record(pool, user_id, InteractionKind::ReplyButton, text).await;
            let markup = ui::orders_menu()?;
            outbound::send_text(
                bot,
                msg.chat.id,
                texts::ORDERS_MENU,
                Some(ReplyMarkup::InlineKeyboard(markup)),
            )
            .await?;
        }
        texts::BTN_SHOPS => {
            audit::record(pool, user_id, InteractionKind::ReplyButton, text).await;
            let shops = db::list_available_shops(pool).await?;
            if shops.is_empty() {
                outbound::send_text(bot, msg.chat.id, texts::NO_SHOPS, None).await?;
            } else {
                let markup = ui::shop_list(&shops)?;
                outbound::send_text(
                    bot,
                    msg.chat.id,
                    texts::SHOP_LIST,
                    Some(ReplyMarkup::InlineKeyboard(markup)),
                )
                .await?;
            }
        }
        texts::BTN_PROFILE => {
            audit::record(pool, user_id, InteractionKind::ReplyButton, text).await;
            let stats = db::order_stats(pool, user_id).await?;
            let text = texts::profile(&user, &stats, cfg.default_service_fee);
            outbound::send_text(bot, msg.chat.id, &text, None).await?;
        }
        texts::BTN_HELP => {
            audit::record(pool, user_id, InteractionKind::ReplyButton, text).await;
            let markup = ui::help_menu(cfg.support_url.as_deref())?;
            outbound::send_text(
                bot,
                msg.chat.id,
                texts::PICK_HELP,
                Some(ReplyMarkup::InlineKeyboard(markup)),
            )
            .await?;
        }
        _ => {
            audit::record(pool, user_id, InteractionKind::Text, text).await;
            match user.state.as_deref().and_then(FlowState::from_tag) {
                Some(state) => {
                    let outcome = flow::advance_text(pool, &user, state, text).await?;
                    render_step(bot, cfg, msg.chat.id, user_id, outcome).await?;
                }
                None => {
                    // Unrecognized input outside any flow: drop whatever
                    // was accumulated and re-anchor on the menu.
                    flow::reset(pool, user_id).await?;
                    outbound::send_text(
                        bot,
                        msg.chat.id,
                        texts::UNKNOWN_ACTION,
                        Some(ReplyMarkup::Keyboard(ui::main_menu())),
                    )
                    .await?;
                }
            }
        }
    }
    Ok(())
}

fn media_file_id(msg: &Message) -> Option<String> {
    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        return Some(photo.file.id.0.clone());
    }
    if let Some(animation) = msg.animation() {
        return Some(animation.file.id.0.clone());
    }
    if let Some(video) = msg.video() {
        return Some(video.file.id.0.clone());
    }
    None
}
