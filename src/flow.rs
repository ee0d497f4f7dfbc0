//! The order-creation conversation: a six-step finite state machine driven
//! by the state tag stored on the user row.
//!
//! Step functions mutate state and return a [`StepOutcome`]; the transport
//! layer renders outcomes into messages and keyboards. That split keeps the
//! machine testable against a bare database.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

use crate::db::{self, NewOrder, Shop};

/// Which input the flow expects next. Absence of a tag on the user row
/// means no active flow (menu handling applies).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    OrderLog,
    OrderPass,
    OrderShop,
    OrderPass2,
    OrderAmount,
    OrderComment,
}

impl FlowState {
    pub fn as_tag(self) -> &'static str {
        match self {
            FlowState::OrderLog => "order_log",
            FlowState::OrderPass => "order_pass",
            FlowState::OrderShop => "order_shop",
            FlowState::OrderPass2 => "order_pass2",
            FlowState::OrderAmount => "order_amount",
            FlowState::OrderComment => "order_comment",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "order_log" => FlowState::OrderLog,
            "order_pass" => FlowState::OrderPass,
            "order_shop" => FlowState::OrderShop,
            "order_pass2" => FlowState::OrderPass2,
            "order_amount" => FlowState::OrderAmount,
            "order_comment" => FlowState::OrderComment,
            _ => return None,
        })
    }
}

/// Answers accumulated across steps. Each step fills exactly one field and
/// leaves the rest untouched, so earlier answers survive to finalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shop_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl OrderDraft {
    /// Parse the stored state blob; an absent or corrupt blob starts empty.
    pub fn from_blob(blob: Option<&str>) -> Self {
        blob.and_then(|s| serde_json::from_str(s).ok()).unwrap_or_default()
    }

    pub fn to_blob(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize order draft")
    }

    /// Convert into an order, requiring every field the final step needs.
    /// `pass2` stays optional: only some shops ask for it.
    pub fn finalize(&self) -> Result<NewOrder> {
        ensure!(self.log.is_some(), "order draft missing log");
        ensure!(self.pass1.is_some(), "order draft missing pass1");
        ensure!(self.shop_id.is_some(), "order draft missing shop_id");
        ensure!(self.amount.is_some(), "order draft missing amount");
        ensure!(self.comment.is_some(), "order draft missing comment");

        Ok(NewOrder {
            log: self.log.clone().unwrap_or_default(),
            pass1: self.pass1.clone().unwrap_or_default(),
            shop_id: self.shop_id.unwrap_or_default(),
            pass2: self.pass2.clone(),
            amount: self.amount.unwrap_or_default(),
            comment: self.comment.clone().unwrap_or_default(),
        })
    }
}

/// What the transport layer should do after a step ran.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Flow started; ask for the account log.
    AskLog,
    AskPass,
    /// Present the shop choices.
    AskShop(Vec<Shop>),
    AskPass2,
    AskAmount,
    AskComment,
    /// Amount input rejected; re-prompt and stay in the same state.
    WrongAmount,
    /// Stale reference or replayed final step; say nothing.
    Ignored,
    /// Order created; notify admins and confirm to the user.
    Created { order_id: i64 },
}

/// Enter the flow: clear any accumulated data and expect the log next.
pub async fn start(pool: &SqlitePool, user_id: i64) -> Result<StepOutcome> {
    let blob = OrderDraft::default().to_blob()?;
    db::set_flow(pool, user_id, Some(FlowState::OrderLog.as_tag()), Some(&blob)).await?;
    Ok(StepOutcome::AskLog)
}

/// Abandon the flow and drop accumulated data.
pub async fn reset(pool: &SqlitePool, user_id: i64) -> Result<()> {
    db::reset_flow(pool, user_id).await
}

/// Advance the flow with a text input from the given state.
pub async fn advance_text(
    pool: &SqlitePool,
    user: &db::User,
    state: FlowState,
    text: &str,
) -> Result<StepOutcome> {
    let mut draft = OrderDraft::from_blob(user.state_data.as_deref());

    match state {
        FlowState::OrderLog => {
            draft.log = Some(text.to_string());
            store(pool, user.user_id, FlowState::OrderPass, &draft).await?;
            Ok(StepOutcome::AskPass)
        }
        FlowState::OrderPass => {
            draft.pass1 = Some(text.to_string());
            store(pool, user.user_id, FlowState::OrderShop, &draft).await?;
            Ok(StepOutcome::AskShop(db::list_available_shops(pool).await?))
        }
        // Shop choice arrives as a button press; free text here just
        // re-presents the choices.
        FlowState::OrderShop => Ok(StepOutcome::AskShop(db::list_available_shops(pool).await?)),
        FlowState::OrderPass2 => {
            draft.pass2 = Some(text.to_string());
            store(pool, user.user_id, FlowState::OrderAmount, &draft).await?;
            Ok(StepOutcome::AskAmount)
        }
        FlowState::OrderAmount => match parse_amount(text) {
            Some(amount) => {
                draft.amount = Some(amount);
                store(pool, user.user_id, FlowState::OrderComment, &draft).await?;
                Ok(StepOutcome::AskComment)
            }
            None => {
                debug!(user_id = user.user_id, input = text, "rejected order amount");
                Ok(StepOutcome::WrongAmount)
            }
        },
        FlowState::OrderComment => {
            draft.comment = Some(text.to_string());
            let order = draft.finalize()?;
            match db::finalize_order(pool, user.user_id, state.as_tag(), &order).await? {
                Some(order_id) => Ok(StepOutcome::Created { order_id }),
                None => Ok(StepOutcome::Ignored),
            }
        }
    }
}

/// Handle an inline shop selection.
///
/// A stale token pointing at a deleted shop is a silent no-op; the flow
/// stays where it is. A shop that requires a second credential routes to
/// the pass2 step, otherwise straight to the amount.
pub async fn select_shop(pool: &SqlitePool, user: &db::User, shop_id: i64) -> Result<StepOutcome> {
    let Some(shop) = db::get_shop(pool, shop_id).await? else {
        debug!(user_id = user.user_id, shop_id, "ignoring stale shop selection");
        return Ok(StepOutcome::Ignored);
    };

    let mut draft = OrderDraft::from_blob(user.state_data.as_deref());
    draft.shop_id = Some(shop.id);

    if shop.pass2 {
        store(pool, user.user_id, FlowState::OrderPass2, &draft).await?;
        Ok(StepOutcome::AskPass2)
    } else {
        store(pool, user.user_id, FlowState::OrderAmount, &draft).await?;
        Ok(StepOutcome::AskAmount)
    }
}

/// Amounts are whole numbers: every character a decimal digit,
/// nothing else. No sign, no separators, no whitespace.
fn parse_amount(text: &str) -> Option<i64> {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

async fn store(
    pool: &SqlitePool,
    user_id: i64,
    next: FlowState,
    draft: &OrderDraft,
) -> Result<()> {
    let blob = draft.to_blob()?;
    db::set_flow(pool, user_id, Some(next.as_tag()), Some(&blob)).await
}
