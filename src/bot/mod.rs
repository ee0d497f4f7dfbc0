//! Telegram transport layer: one handler per update kind plus the
//! keyboard builders. Business state lives in [`crate::flow`]; these
//! modules only translate updates in and [`StepOutcome`]s out.

pub mod callback_handler;
pub mod message_handler;
pub mod ui;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::ReplyMarkup;

use crate::config::Config;
use crate::flow::StepOutcome;
use crate::{outbound, texts};

/// Turn a flow step result into the next message to the user. Shared by
/// the text and callback paths so both render transitions identically.
pub(crate) async fn render_step(
    bot: &Bot,
    cfg: &Config,
    chat_id: ChatId,
    user_id: i64,
    outcome: StepOutcome,
) -> Result<()> {
    match outcome {
        StepOutcome::AskLog => {
            outbound::send_text(bot, chat_id, texts::ASK_LOG, None).await?;
        }
        StepOutcome::AskPass => {
            outbound::send_text(bot, chat_id, texts::ASK_PASS, None).await?;
        }
        StepOutcome::AskShop(shops) => {
            if shops.is_empty() {
                outbound::send_text(bot, chat_id, texts::NO_SHOPS, None).await?;
            } else {
                let markup = ui::shop_choice(&shops)?;
                outbound::send_text(
                    bot,
                    chat_id,
                    texts::ASK_SHOP,
                    Some(ReplyMarkup::InlineKeyboard(markup)),
                )
                .await?;
            }
        }
        StepOutcome::AskPass2 => {
            outbound::send_text(bot, chat_id, texts::ASK_PASS2, None).await?;
        }
        StepOutcome::AskAmount => {
            outbound::send_text(bot, chat_id, texts::ASK_AMOUNT, None).await?;
        }
        StepOutcome::AskComment => {
            outbound::send_text(bot, chat_id, texts::ASK_COMMENT, None).await?;
        }
        StepOutcome::WrongAmount => {
            outbound::send_text(bot, chat_id, texts::WRONG_AMOUNT, None).await?;
        }
        StepOutcome::Ignored => {}
        StepOutcome::Created { order_id } => {
            outbound::send_text(
                bot,
                chat_id,
                texts::ORDER_CREATED,
                Some(ReplyMarkup::Keyboard(ui::main_menu())),
            )
            .await?;
            outbound::broadcast_to_admins(
                bot,
                &cfg.admin_chat_ids,
                &texts::admin_new_order(order_id, user_id),
            )
            .await;
        }
    }
    Ok(())
}
