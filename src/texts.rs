//! User-facing copy: button labels, prompts, and message renderers.
//! Messages are sent as HTML, so dynamic values go through [`escape`].

use chrono::{DateTime, Utc};

use crate::db::{OrderDetails, OrderStats, OrderStatus, Question, ShopDetails, User};

// Reply-keyboard labels double as routing keys, so they live here as
// constants rather than inline strings.
pub const BTN_ORDERS: &str = "📦 Orders";
pub const BTN_SHOPS: &str = "🏪 Shops";
pub const BTN_PROFILE: &str = "👤 Profile";
pub const BTN_HELP: &str = "❓ Help";

pub const BTN_NEW_ORDER: &str = "➕ New order";
pub const BTN_ORDER_HISTORY: &str = "📜 History";
pub const BTN_FAQ: &str = "📖 FAQ";
pub const BTN_SUPPORT: &str = "💬 Support";
pub const BTN_PAY: &str = "💳 Pay invoice";

pub const WELCOME: &str = "Welcome! Use the menu below to place and track orders.";
pub const UNKNOWN_ACTION: &str = "I did not understand that. Use the menu below.";

pub const ASK_LOG: &str = "Send the account log for this order.";
pub const ASK_PASS: &str = "Now send the account password.";
pub const ASK_SHOP: &str = "Pick the shop for this order:";
pub const ASK_PASS2: &str = "This shop needs a second password. Send it now.";
pub const ASK_AMOUNT: &str = "Send the order amount (digits only).";
pub const ASK_COMMENT: &str = "Add a comment for this order (or just a dash).";
pub const WRONG_AMOUNT: &str = "The amount must be a whole number of digits. Try again.";
pub const ORDER_CREATED: &str = "Order received ✅ You will be notified when it is processed.";
pub const NO_SHOPS: &str = "No shops are available right now. Try again later.";
pub const NO_ORDERS: &str = "You have no orders yet.";
pub const NO_FAQ: &str = "No FAQ entries yet.";
pub const ORDERS_MENU: &str = "Your orders:";
pub const SHOP_LIST: &str = "Available shops:";
pub const PICK_HELP: &str = "How can we help?";
pub const PICK_FAQ: &str = "Frequently asked questions:";

/// Escape text for Telegram HTML parse mode.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn status_emoji(status: Option<OrderStatus>) -> &'static str {
    match status {
        Some(OrderStatus::Awaiting) => "⏳",
        Some(OrderStatus::InProgress) => "🔄",
        Some(OrderStatus::Declined) => "🚫",
        Some(OrderStatus::Failed) => "❌",
        Some(OrderStatus::DoneAwaitingPayment) => "💳",
        Some(OrderStatus::Payed) => "✅",
        None => "❔",
    }
}

pub fn status_label(status: Option<OrderStatus>) -> &'static str {
    match status {
        Some(OrderStatus::Awaiting) => "awaiting",
        Some(OrderStatus::InProgress) => "in progress",
        Some(OrderStatus::Declined) => "declined",
        Some(OrderStatus::Failed) => "failed",
        Some(OrderStatus::DoneAwaitingPayment) => "done, awaiting payment",
        Some(OrderStatus::Payed) => "payed",
        None => "unknown",
    }
}

fn date(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

pub fn media_echo(file_id: &str) -> String {
    format!("<code>{}</code>", escape(file_id))
}

pub fn profile(user: &User, stats: &OrderStats, default_fee: f64) -> String {
    let name = user.username.as_deref().unwrap_or("-");
    let fee = user.service_fee.unwrap_or(default_fee);
    format!(
        "👤 <b>Profile</b>\n\
         Username: @{}\n\
         Registered: {}\n\
         Service fee: {}%\n\
         Orders: {}\n\
         Total: {}",
        escape(name),
        date(user.created),
        fee,
        stats.orders_qty,
        stats.total,
    )
}

/// One line per order in the history keyboard.
pub fn history_line(order: &OrderDetails) -> String {
    format!(
        "{} #{} {} — {}",
        status_emoji(order.status()),
        order.id,
        order.shop_name,
        order.amount
    )
}

pub fn order_full_info(order: &OrderDetails) -> String {
    format!(
        "📦 <b>Order #{}</b>\n\
         Shop: {}\n\
         Amount: {}\n\
         Status: {} {}\n\
         Created: {}\n\
         Comment: {}",
        order.id,
        escape(&order.shop_name),
        order.amount,
        status_emoji(order.status()),
        status_label(order.status()),
        date(order.created),
        escape(&order.comment),
    )
}

pub fn shop_full_info(shop: &ShopDetails) -> String {
    format!(
        "🏪 <b>{}</b>\n\
         Country: {}\n\
         Purchase limit: {}\n\
         In stock: {}\n\
         Timeframe: {}\n\n\
         {}",
        escape(&shop.name),
        escape(&shop.country),
        shop.purchase_limit,
        shop.quantity,
        escape(&shop.timeframe),
        escape(&shop.comment),
    )
}

pub fn faq_answer(question: &Question) -> String {
    format!("<b>{}</b>\n\n{}", escape(&question.title), escape(&question.answer))
}

pub fn invoice_notice(order_id: i64, price: f64, currency: &str) -> String {
    format!(
        "💳 Order #{order_id} is done. Pay <b>{price} {currency}</b> using the button below."
    )
}

pub fn payment_received(order_id: i64) -> String {
    format!("✅ Payment for order #{order_id} received. Thank you!")
}

pub fn admin_new_order(order_id: i64, user_id: i64) -> String {
    format!("🔔 New order #{order_id} from user {user_id}")
}

pub fn admin_order_payed(order_id: i64, price: f64, currency: &str) -> String {
    format!("💰 Order #{order_id} payed ({price} {currency})")
}

pub fn admin_failure(context: &str, error: &str) -> String {
    format!("⚠️ {}\n<pre>{}</pre>", escape(context), escape(error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape("a<b>&c"), "a&lt;b&gt;&amp;c");
    }

    #[test]
    fn test_every_status_has_distinct_emoji() {
        let all = [
            OrderStatus::Awaiting,
            OrderStatus::Declined,
            OrderStatus::InProgress,
            OrderStatus::Failed,
            OrderStatus::DoneAwaitingPayment,
            OrderStatus::Payed,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(status_emoji(Some(*a)), status_emoji(Some(*b)));
            }
        }
        assert_eq!(status_emoji(None), "❔");
    }
}
