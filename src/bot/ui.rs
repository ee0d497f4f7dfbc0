//! Keyboard builders. Inline keyboards carry encoded callback tokens, so
//! most builders are fallible: a label that pushes a payload past the
//! token ceiling surfaces at build time, not as a dead button.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
};

use crate::callback::{encode, CallbackAction};
use crate::db::{OrderDetails, Question, Shop};
use crate::texts;

/// The persistent reply keyboard under the input field.
pub fn main_menu() -> KeyboardMarkup {
    KeyboardMarkup::new([
        vec![
            KeyboardButton::new(texts::BTN_ORDERS),
            KeyboardButton::new(texts::BTN_SHOPS),
        ],
        vec![
            KeyboardButton::new(texts::BTN_PROFILE),
            KeyboardButton::new(texts::BTN_HELP),
        ],
    ])
    .resize_keyboard()
}

fn callback_button(label: &str, action: CallbackAction, args: Value) -> Result<InlineKeyboardButton> {
    Ok(InlineKeyboardButton::callback(label, encode(action, &args)?))
}

pub fn orders_menu() -> Result<InlineKeyboardMarkup> {
    Ok(InlineKeyboardMarkup::new([
        vec![callback_button(texts::BTN_NEW_ORDER, CallbackAction::AddOrder, Value::Null)?],
        vec![callback_button(texts::BTN_ORDER_HISTORY, CallbackAction::OrderHistory, Value::Null)?],
    ]))
}

/// Shop choices inside the order flow: picking one advances the flow.
pub fn shop_choice(shops: &[Shop]) -> Result<InlineKeyboardMarkup> {
    let rows = shops
        .iter()
        .map(|shop| {
            Ok(vec![callback_button(
                &shop.name,
                CallbackAction::OrderShop,
                json!({ "id": shop.id }),
            )?])
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(InlineKeyboardMarkup::new(rows))
}

/// The browsable shop list: picking one shows its details.
pub fn shop_list(shops: &[Shop]) -> Result<InlineKeyboardMarkup> {
    let rows = shops
        .iter()
        .map(|shop| {
            Ok(vec![callback_button(
                &shop.name,
                CallbackAction::ShopInfo,
                json!({ "id": shop.id }),
            )?])
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(InlineKeyboardMarkup::new(rows))
}

pub fn history(orders: &[OrderDetails]) -> Result<InlineKeyboardMarkup> {
    let mut rows = orders
        .iter()
        .map(|order| {
            Ok(vec![callback_button(
                &texts::history_line(order),
                CallbackAction::OrderHistoryInfo,
                json!({ "id": order.id }),
            )?])
        })
        .collect::<Result<Vec<_>>>()?;
    rows.push(vec![callback_button("« Back", CallbackAction::Orders, Value::Null)?]);
    Ok(InlineKeyboardMarkup::new(rows))
}

/// Navigation under a single order's details.
pub fn order_info_nav() -> Result<InlineKeyboardMarkup> {
    Ok(InlineKeyboardMarkup::new([[callback_button(
        "« Back",
        CallbackAction::OrderHistory,
        Value::Null,
    )?]]))
}

pub fn help_menu(support_url: Option<&str>) -> Result<InlineKeyboardMarkup> {
    let mut rows = vec![vec![callback_button(texts::BTN_FAQ, CallbackAction::Faq, Value::Null)?]];
    if let Some(url) = support_url {
        let url = url.parse().context("support link is not a url")?;
        rows.push(vec![InlineKeyboardButton::url(texts::BTN_SUPPORT, url)]);
    }
    Ok(InlineKeyboardMarkup::new(rows))
}

pub fn faq(questions: &[Question]) -> Result<InlineKeyboardMarkup> {
    let rows = questions
        .iter()
        .map(|q| {
            Ok(vec![callback_button(
                &q.title,
                CallbackAction::FaqQuestion,
                json!({ "id": q.id }),
            )?])
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(InlineKeyboardMarkup::new(rows))
}

/// Navigation under a single FAQ answer.
pub fn faq_nav() -> Result<InlineKeyboardMarkup> {
    Ok(InlineKeyboardMarkup::new([[callback_button(
        "« Back",
        CallbackAction::Faq,
        Value::Null,
    )?]]))
}
