//! Invoicing and the payment provider callback.
//!
//! When an order is finished it moves to "done, awaiting payment": the
//! status flip is the durable step, then an invoice is requested from the
//! provider and the user is pointed at it. The provider confirms payment
//! through a small axum webhook.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ReplyMarkup};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::{self, OrderStatus};
use crate::{outbound, texts};

const INVOICE_ENDPOINT: &str = "https://api.nowpayments.io/v1/invoice";
const PRICE_CURRENCY: &str = "usd";
const IPN_SECRET_HEADER: &str = "x-ipn-secret";

/// What the user owes for an order: the amount scaled by the service fee
/// percentage, per-user override first.
pub fn invoice_amount(amount: i64, fee_override: Option<f64>, default_fee: f64) -> f64 {
    amount as f64 * fee_override.unwrap_or(default_fee) / 100.0
}

#[derive(Debug, Serialize)]
struct InvoiceRequest<'a> {
    price_amount: f64,
    price_currency: &'a str,
    order_id: String,
    ipn_callback_url: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub invoice_url: String,
}

/// Request an invoice from the provider for the given price.
pub async fn create_invoice(cfg: &Config, order_id: i64, price: f64) -> Result<Invoice> {
    let Some(api_key) = cfg.payment_api_key.as_deref() else {
        bail!("payment provider is not configured");
    };

    let resp = reqwest::Client::new()
        .post(INVOICE_ENDPOINT)
        .header("x-api-key", api_key)
        .json(&InvoiceRequest {
            price_amount: price,
            price_currency: PRICE_CURRENCY,
            order_id: order_id.to_string(),
            ipn_callback_url: &cfg.payment_callback_url,
        })
        .send()
        .await
        .context("invoice request failed")?;

    if !resp.status().is_success() {
        bail!("invoice request rejected with status {}", resp.status());
    }
    resp.json().await.context("failed to parse invoice response")
}

/// Finish an order: flip it to "done, awaiting payment", then invoice and
/// notify. The status flip is never rolled back; invoicing and delivery
/// failures are reported to admins and left for manual follow-up.
pub async fn mark_done_awaiting_payment(
    bot: &Bot,
    pool: &SqlitePool,
    cfg: &Config,
    order_id: i64,
) -> Result<()> {
    let Some(order) = db::get_order_details(pool, order_id).await? else {
        bail!("order {order_id} does not exist");
    };
    db::set_order_status(pool, order_id, OrderStatus::DoneAwaitingPayment).await?;

    let user = db::get_user(pool, order.user_id).await?;
    let fee_override = user.as_ref().and_then(|u| u.service_fee);
    let price = invoice_amount(order.amount, fee_override, cfg.default_service_fee);

    match create_invoice(cfg, order_id, price).await {
        Ok(invoice) => {
            let markup = InlineKeyboardMarkup::new([[InlineKeyboardButton::url(
                texts::BTN_PAY,
                invoice.invoice_url.parse().context("provider returned a bad invoice url")?,
            )]]);
            outbound::send_text(
                bot,
                ChatId(order.user_id),
                &texts::invoice_notice(order_id, price, PRICE_CURRENCY),
                Some(ReplyMarkup::InlineKeyboard(markup)),
            )
            .await?;
            info!(order_id, price, invoice_id = %invoice.id, "invoice issued");
        }
        Err(e) => {
            error!(order_id, error = %e, "failed to issue invoice");
            outbound::report_failure(
                bot,
                &cfg.admin_chat_ids,
                &format!("invoice for order #{order_id} failed"),
                &e.to_string(),
            )
            .await;
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct WebhookState {
    pub bot: Bot,
    pub pool: SqlitePool,
    pub cfg: Arc<Config>,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/payment", post(handle_payment_notice))
        .route("/orders/:order_id/done", post(handle_order_done))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PaymentNotice {
    order_id: i64,
    price_amount: f64,
}

fn authorized(cfg: &Config, headers: &HeaderMap) -> bool {
    match cfg.payment_ipn_secret.as_deref() {
        Some(secret) => headers
            .get(IPN_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == secret)
            .unwrap_or(false),
        None => true,
    }
}

/// Provider confirmation that an invoice was paid. Unknown orders are
/// acknowledged and dropped so the provider stops retrying.
async fn handle_payment_notice(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    Form(notice): Form<PaymentNotice>,
) -> StatusCode {
    if !authorized(&state.cfg, &headers) {
        warn!(order_id = notice.order_id, "payment notice with bad secret");
        return StatusCode::FORBIDDEN;
    }

    let order = match db::get_order_details(&state.pool, notice.order_id).await {
        Ok(Some(order)) => order,
        Ok(None) => {
            warn!(order_id = notice.order_id, "payment notice for unknown order");
            return StatusCode::OK;
        }
        Err(e) => {
            error!(order_id = notice.order_id, error = %e, "payment notice lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    if let Err(e) = db::set_order_status(&state.pool, order.id, OrderStatus::Payed).await {
        error!(order_id = order.id, error = %e, "failed to mark order payed");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    if let Err(e) = db::create_payment(&state.pool, order.user_id, notice.price_amount).await {
        error!(order_id = order.id, error = %e, "failed to record payment");
    }
    info!(order_id = order.id, price = notice.price_amount, "order payed");

    let _ = outbound::send_text(
        &state.bot,
        ChatId(order.user_id),
        &texts::payment_received(order.id),
        None,
    )
    .await;
    outbound::broadcast_to_admins(
        &state.bot,
        &state.cfg.admin_chat_ids,
        &texts::admin_order_payed(order.id, notice.price_amount, PRICE_CURRENCY),
    )
    .await;
    StatusCode::OK
}

/// Operator hook that finishes an order and triggers the invoice.
async fn handle_order_done(
    State(state): State<WebhookState>,
    Path(order_id): Path<i64>,
    headers: HeaderMap,
) -> StatusCode {
    if !authorized(&state.cfg, &headers) {
        return StatusCode::FORBIDDEN;
    }
    match mark_done_awaiting_payment(&state.bot, &state.pool, &state.cfg, order_id).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            error!(order_id, error = %e, "failed to finish order");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_amount_uses_default_fee() {
        assert_eq!(invoice_amount(200, None, 1.0), 2.0);
        assert_eq!(invoice_amount(50, None, 2.0), 1.0);
    }

    #[test]
    fn test_invoice_amount_prefers_user_override() {
        assert_eq!(invoice_amount(200, Some(0.5), 1.0), 1.0);
        assert_eq!(invoice_amount(200, Some(0.0), 1.0), 0.0);
    }
}
