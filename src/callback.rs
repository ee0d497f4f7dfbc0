//! Inline-button token codec.
//!
//! A token is `@&<action id>&<json payload>`: a fixed prefix, a decimal
//! action id, and a JSON argument blob, joined with `&`. Telegram caps
//! callback data at 64 bytes, so encoding enforces that ceiling and
//! payloads stay down to bare ids.

use anyhow::{ensure, Result};
use serde_json::Value;

/// Telegram's limit on callback data.
pub const MAX_TOKEN_BYTES: usize = 64;

const PREFIX: &str = "@";
const SEP: char = '&';

/// Every operation reachable from an inline button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    AddOrder = 0x00,
    OrderShop = 0x01,
    OrderHistory = 0x02,
    OrderHistoryInfo = 0x03,
    ShopInfo = 0x04,
    Faq = 0x05,
    FaqQuestion = 0x06,
    Help = 0x07,
    Orders = 0x08,
}

impl CallbackAction {
    fn from_id(id: u32) -> Option<Self> {
        Some(match id {
            0x00 => CallbackAction::AddOrder,
            0x01 => CallbackAction::OrderShop,
            0x02 => CallbackAction::OrderHistory,
            0x03 => CallbackAction::OrderHistoryInfo,
            0x04 => CallbackAction::ShopInfo,
            0x05 => CallbackAction::Faq,
            0x06 => CallbackAction::FaqQuestion,
            0x07 => CallbackAction::Help,
            0x08 => CallbackAction::Orders,
            _ => return None,
        })
    }
}

/// Build a token for an inline button.
pub fn encode(action: CallbackAction, args: &Value) -> Result<String> {
    let token = format!("{PREFIX}{SEP}{}{SEP}{args}", action as u32);
    ensure!(
        token.len() <= MAX_TOKEN_BYTES,
        "callback token is {} bytes, limit is {MAX_TOKEN_BYTES}",
        token.len()
    );
    Ok(token)
}

/// Parse an incoming token. Anything malformed, including tokens from an
/// older bot generation, yields `None` and the press is dropped.
pub fn decode(data: &str) -> Option<(CallbackAction, Value)> {
    let mut parts = data.splitn(3, SEP);
    if parts.next()? != PREFIX {
        return None;
    }
    let id = parts.next()?;
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let action = CallbackAction::from_id(id.parse().ok()?)?;
    let args = serde_json::from_str(parts.next()?).ok()?;
    Some((action, args))
}
