//! Inline button handling: decode the token, route by action, edit the
//! originating message in place where the screen allows it.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, InlineKeyboardMarkup, ReplyMarkup};
use tracing::{debug, error};

use crate::audit::{self, InteractionKind};
use crate::callback::{decode, CallbackAction};
use crate::config::Config;
use crate::flow;
use crate::registry::{self, UserGate};
use crate::{db, outbound, texts};

use super::{render_step, ui};

/// Dispatcher entry point for callback queries. Same boundary policy as
/// the message handler: report, swallow. The query is answered afterwards
/// unless the sender is banned; banned users get no response at all.
pub async fn handle(
    bot: Bot,
    q: CallbackQuery,
    pool: SqlitePool,
    cfg: Arc<Config>,
    gate: UserGate,
) -> Result<()> {
    let acknowledge = match process(&bot, &q, &pool, &cfg, &gate).await {
        Ok(acknowledge) => acknowledge,
        Err(e) => {
            error!(user_id = q.from.id.0, error = %e, "callback handler failed");
            outbound::report_failure(
                &bot,
                &cfg.admin_chat_ids,
                "callback handler failed",
                &format!("{e:#}"),
            )
            .await;
            true
        }
    };
    // Telegram keeps the button spinner until the query is answered.
    if acknowledge {
        if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
            debug!(error = %e, "failed to answer callback query");
        }
    }
    Ok(())
}

/// Route one callback query. Returns whether the query should be
/// acknowledged: `false` only for banned senders, whose presses must stay
/// entirely unanswered.
pub async fn process(
    bot: &Bot,
    q: &CallbackQuery,
    pool: &SqlitePool,
    cfg: &Config,
    gate: &UserGate,
) -> Result<bool> {
    let user_id = q.from.id.0 as i64;
    let _guard = gate.acquire(user_id).await;

    let Some(user) = registry::resolve(
        pool,
        user_id,
        q.from.username.as_deref(),
        Some(&q.from.first_name),
        q.from.last_name.as_deref(),
    )
    .await?
    else {
        return Ok(false);
    };

    let Some(data) = q.data.as_deref() else {
        return Ok(true);
    };

    // Audit the press under the label the user saw, not the wire token.
    let label = audit::pressed_button_label(q).unwrap_or_else(|| data.to_string());
    audit::record(pool, user_id, InteractionKind::InlineButton, &label).await;

    let Some((action, args)) = decode(data) else {
        debug!(user_id, data, "dropping undecodable callback token");
        return Ok(true);
    };
    let chat_id = ChatId(user_id);

    match action {
        CallbackAction::AddOrder => {
            let outcome = flow::start(pool, user_id).await?;
            render_step(bot, cfg, chat_id, user_id, outcome).await?;
        }
        CallbackAction::OrderShop => {
            let Some(shop_id) = args["id"].as_i64() else {
                debug!(user_id, %args, "shop selection without an id");
                return Ok(true);
            };
            let outcome = flow::select_shop(pool, &user, shop_id).await?;
            render_step(bot, cfg, chat_id, user_id, outcome).await?;
        }
        CallbackAction::Orders => {
            show(bot, q, chat_id, texts::ORDERS_MENU, Some(ui::orders_menu()?)).await?;
        }
        CallbackAction::OrderHistory => {
            let orders = db::list_order_history(pool, user_id).await?;
            if orders.is_empty() {
                show(bot, q, chat_id, texts::NO_ORDERS, Some(ui::order_info_nav()?)).await?;
            } else {
                show(bot, q, chat_id, texts::BTN_ORDER_HISTORY, Some(ui::history(&orders)?))
                    .await?;
            }
        }
        CallbackAction::OrderHistoryInfo => {
            let Some(order_id) = args["id"].as_i64() else {
                return Ok(true);
            };
            // Only the owner's orders are shown; a stale or foreign id is
            // a silent no-op.
            match db::get_order_details(pool, order_id).await? {
                Some(order) if order.user_id == user_id => {
                    show(bot, q, chat_id, &texts::order_full_info(&order), Some(ui::order_info_nav()?))
                        .await?;
                }
                _ => debug!(user_id, order_id, "ignoring stale order reference"),
            }
        }
        CallbackAction::ShopInfo => {
            let Some(shop_id) = args["id"].as_i64() else {
                return Ok(true);
            };
            match db::get_shop_details(pool, shop_id).await? {
                Some(shop) => {
                    show(bot, q, chat_id, &texts::shop_full_info(&shop), None).await?;
                }
                None => debug!(user_id, shop_id, "ignoring stale shop reference"),
            }
        }
        CallbackAction::Help => {
            show(bot, q, chat_id, texts::PICK_HELP, Some(ui::help_menu(cfg.support_url.as_deref())?))
                .await?;
        }
        CallbackAction::Faq => {
            let questions = db::list_questions(pool).await?;
            if questions.is_empty() {
                show(bot, q, chat_id, texts::NO_FAQ, None).await?;
            } else {
                show(bot, q, chat_id, texts::PICK_FAQ, Some(ui::faq(&questions)?)).await?;
            }
        }
        CallbackAction::FaqQuestion => {
            let Some(question_id) = args["id"].as_i64() else {
                return Ok(true);
            };
            match db::get_question(pool, question_id).await? {
                Some(question) => {
                    show(bot, q, chat_id, &texts::faq_answer(&question), Some(ui::faq_nav()?))
                        .await?;
                }
                None => debug!(user_id, question_id, "ignoring stale question reference"),
            }
        }
    }
    Ok(true)
}

/// Edit the originating message in place when it is still accessible,
/// otherwise fall back to a fresh message.
async fn show(
    bot: &Bot,
    q: &CallbackQuery,
    chat_id: ChatId,
    text: &str,
    markup: Option<InlineKeyboardMarkup>,
) -> Result<()> {
    match q.message.as_ref().and_then(|m| m.regular_message()) {
        Some(message) => outbound::edit_text(bot, message.chat.id, message.id, text, markup).await,
        None => outbound::send_text(bot, chat_id, text, markup.map(ReplyMarkup::InlineKeyboard))
            .await
            .map(|_| ()),
    }
}
