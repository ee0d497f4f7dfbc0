//! SQLite persistence layer: users, shops, orders, payments, FAQ entries,
//! broadcast posts and the interaction audit log.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// A Telegram user known to the bot, including their conversation state.
///
/// `state` and `state_data` are service columns owned by the order flow:
/// either both are set (an order flow is active) or both are NULL.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub user_id: i64,
    pub created: DateTime<Utc>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub service_fee: Option<f64>,
    pub is_banned: bool,
    pub state: Option<String>,
    pub state_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Shop {
    pub id: i64,
    pub name: String,
    pub country_id: i64,
    pub purchase_limit: i64,
    pub quantity: i64,
    pub timeframe: String,
    pub pass2: bool,
    pub comment: String,
    pub available: bool,
}

/// A shop joined with its country name, for the shop info screen.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShopDetails {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub purchase_limit: i64,
    pub quantity: i64,
    pub timeframe: String,
    pub comment: String,
}

/// Lifecycle of an order. User-driven creation always starts at `Awaiting`;
/// later transitions are admin- or payment-callback-driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Awaiting,
    Declined,
    InProgress,
    Failed,
    DoneAwaitingPayment,
    Payed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Awaiting => "awaiting",
            OrderStatus::Declined => "declined",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Failed => "failed",
            OrderStatus::DoneAwaitingPayment => "done_awaiting_payment",
            OrderStatus::Payed => "payed",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "awaiting" => OrderStatus::Awaiting,
            "declined" => OrderStatus::Declined,
            "in_progress" => OrderStatus::InProgress,
            "failed" => OrderStatus::Failed,
            "done_awaiting_payment" => OrderStatus::DoneAwaitingPayment,
            "payed" => OrderStatus::Payed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub user_id: i64,
    pub log: String,
    pub pass1: String,
    pub shop_id: i64,
    pub pass2: Option<String>,
    pub amount: i64,
    pub comment: String,
    pub status: String,
}

impl Order {
    pub fn status(&self) -> Option<OrderStatus> {
        OrderStatus::from_tag(&self.status)
    }
}

/// An order joined with its shop name, for history and order info screens.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderDetails {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub user_id: i64,
    pub log: String,
    pub pass1: String,
    pub shop_name: String,
    pub pass2: Option<String>,
    pub amount: i64,
    pub comment: String,
    pub status: String,
}

impl OrderDetails {
    pub fn status(&self) -> Option<OrderStatus> {
        OrderStatus::from_tag(&self.status)
    }
}

/// Fields collected by a completed order flow, ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub log: String,
    pub pass1: String,
    pub shop_id: i64,
    pub pass2: Option<String>,
    pub amount: i64,
    pub comment: String,
}

/// Per-user totals shown on the profile screen.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct OrderStats {
    pub orders_qty: i64,
    pub total: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Question {
    pub id: i64,
    pub title: String,
    pub answer: String,
}

/// Queue states for broadcast posts.
pub const POST_WAIT: &str = "wait";
pub const POST_SENDING: &str = "sending";
pub const POST_DONE: &str = "done";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub status: String,
    pub photo_id: Option<String>,
    pub gif_id: Option<String>,
    pub message: String,
    pub preview: bool,
    pub button: Option<String>,
    pub link: Option<String>,
    pub receivers: Option<i64>,
}

/// Connect to the SQLite database, creating the file if missing.
pub async fn connect(url: &str) -> Result<SqlitePool> {
    connect_with_pool_size(url, 10).await
}

pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("invalid database url: {url}"))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(pool_size)
        .connect_with(options)
        .await
        .context("failed to open database")?;

    info!(url, pool_size, "connected to database");
    Ok(pool)
}

/// Initialize the database schema.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    info!("initializing database schema");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY,
            created DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            username TEXT,
            first_name TEXT,
            last_name TEXT,
            service_fee REAL,
            is_banned INTEGER NOT NULL DEFAULT 0,
            state TEXT,
            state_data TEXT
        )",
    )
    .execute(pool)
    .await
    .context("failed to create users table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            content TEXT
        )",
    )
    .execute(pool)
    .await
    .context("failed to create logs table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS countries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("failed to create countries table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS shops (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            country_id INTEGER NOT NULL REFERENCES countries(id) ON DELETE CASCADE,
            purchase_limit INTEGER NOT NULL,
            quantity INTEGER NOT NULL,
            timeframe TEXT NOT NULL,
            pass2 INTEGER NOT NULL,
            comment TEXT NOT NULL DEFAULT '',
            available INTEGER NOT NULL DEFAULT 1
        )",
    )
    .execute(pool)
    .await
    .context("failed to create shops table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
            log TEXT NOT NULL,
            pass1 TEXT NOT NULL,
            shop_id INTEGER NOT NULL REFERENCES shops(id) ON DELETE CASCADE,
            pass2 TEXT,
            amount INTEGER NOT NULL,
            comment TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'awaiting'
        )",
    )
    .execute(pool)
    .await
    .context("failed to create orders table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
            amount REAL NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("failed to create payments table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            answer TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("failed to create questions table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            status TEXT NOT NULL DEFAULT 'wait',
            photo_id TEXT,
            gif_id TEXT,
            message TEXT NOT NULL,
            preview INTEGER NOT NULL DEFAULT 0,
            button TEXT,
            link TEXT,
            receivers INTEGER
        )",
    )
    .execute(pool)
    .await
    .context("failed to create posts table")?;

    info!("database schema initialized");
    Ok(())
}

// ── users ────────────────────────────────────────────────────────────────

pub async fn get_user(pool: &SqlitePool, user_id: i64) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("failed to read user")
}

pub async fn create_user(
    pool: &SqlitePool,
    user_id: i64,
    username: Option<&str>,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> Result<()> {
    sqlx::query("INSERT INTO users (user_id, username, first_name, last_name) VALUES (?, ?, ?, ?)")
        .bind(user_id)
        .bind(username)
        .bind(first_name)
        .bind(last_name)
        .execute(pool)
        .await
        .context("failed to create user")?;

    info!(user_id, "user created");
    Ok(())
}

/// Overwrite the display fields. Idempotent; called on every inbound event.
pub async fn refresh_user(
    pool: &SqlitePool,
    user_id: i64,
    username: Option<&str>,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE users SET username = ?, first_name = ?, last_name = ? WHERE user_id = ?")
        .bind(username)
        .bind(first_name)
        .bind(last_name)
        .bind(user_id)
        .execute(pool)
        .await
        .context("failed to refresh user")?;
    Ok(())
}

/// Write both conversation state columns together; both NULL means no
/// active flow.
pub async fn set_flow(
    pool: &SqlitePool,
    user_id: i64,
    state: Option<&str>,
    state_data: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE users SET state = ?, state_data = ? WHERE user_id = ?")
        .bind(state)
        .bind(state_data)
        .bind(user_id)
        .execute(pool)
        .await
        .context("failed to update conversation state")?;
    Ok(())
}

pub async fn reset_flow(pool: &SqlitePool, user_id: i64) -> Result<()> {
    set_flow(pool, user_id, None, None).await
}

/// All known user ids, newest first. Used by the broadcast sender.
pub async fn list_user_ids(pool: &SqlitePool) -> Result<Vec<i64>> {
    sqlx::query_scalar::<_, i64>("SELECT user_id FROM users ORDER BY created DESC")
        .fetch_all(pool)
        .await
        .context("failed to list user ids")
}

// ── shops ────────────────────────────────────────────────────────────────

pub async fn list_available_shops(pool: &SqlitePool) -> Result<Vec<Shop>> {
    sqlx::query_as::<_, Shop>("SELECT * FROM shops WHERE available = 1 ORDER BY id")
        .fetch_all(pool)
        .await
        .context("failed to list shops")
}

pub async fn get_shop(pool: &SqlitePool, shop_id: i64) -> Result<Option<Shop>> {
    sqlx::query_as::<_, Shop>("SELECT * FROM shops WHERE id = ?")
        .bind(shop_id)
        .fetch_optional(pool)
        .await
        .context("failed to read shop")
}

pub async fn get_shop_details(pool: &SqlitePool, shop_id: i64) -> Result<Option<ShopDetails>> {
    sqlx::query_as::<_, ShopDetails>(
        "SELECT s.id, s.name, c.name AS country, s.purchase_limit, s.quantity,
                s.timeframe, s.comment
         FROM shops s JOIN countries c ON c.id = s.country_id
         WHERE s.id = ?",
    )
    .bind(shop_id)
    .fetch_optional(pool)
    .await
    .context("failed to read shop details")
}

// ── orders ───────────────────────────────────────────────────────────────

/// Atomically complete an order flow: clear the user's conversation state
/// and insert the order in one transaction.
///
/// The UPDATE is guarded on the state tag still being `expected_state`, so
/// a replayed final step finds the claim already taken and creates nothing.
/// Returns the new order id, or `None` when the flow was already finalized.
pub async fn finalize_order(
    pool: &SqlitePool,
    user_id: i64,
    expected_state: &str,
    order: &NewOrder,
) -> Result<Option<i64>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let claimed = sqlx::query(
        "UPDATE users SET state = NULL, state_data = NULL WHERE user_id = ? AND state = ?",
    )
    .bind(user_id)
    .bind(expected_state)
    .execute(&mut *tx)
    .await
    .context("failed to claim order flow")?
    .rows_affected();

    if claimed == 0 {
        tx.rollback().await.ok();
        return Ok(None);
    }

    let order_id = sqlx::query(
        "INSERT INTO orders (user_id, log, pass1, shop_id, pass2, amount, comment)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&order.log)
    .bind(&order.pass1)
    .bind(order.shop_id)
    .bind(&order.pass2)
    .bind(order.amount)
    .bind(&order.comment)
    .execute(&mut *tx)
    .await
    .context("failed to insert order")?
    .last_insert_rowid();

    tx.commit().await.context("failed to commit order")?;

    info!(user_id, order_id, "order created");
    Ok(Some(order_id))
}

pub async fn get_order(pool: &SqlitePool, order_id: i64) -> Result<Option<Order>> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
        .bind(order_id)
        .fetch_optional(pool)
        .await
        .context("failed to read order")
}

pub async fn get_order_details(pool: &SqlitePool, order_id: i64) -> Result<Option<OrderDetails>> {
    sqlx::query_as::<_, OrderDetails>(
        "SELECT o.id, o.created, o.user_id, o.log, o.pass1, s.name AS shop_name,
                o.pass2, o.amount, o.comment, o.status
         FROM orders o JOIN shops s ON s.id = o.shop_id
         WHERE o.id = ?",
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await
    .context("failed to read order details")
}

/// A user's orders joined with shop names, newest first.
pub async fn list_order_history(pool: &SqlitePool, user_id: i64) -> Result<Vec<OrderDetails>> {
    sqlx::query_as::<_, OrderDetails>(
        "SELECT o.id, o.created, o.user_id, o.log, o.pass1, s.name AS shop_name,
                o.pass2, o.amount, o.comment, o.status
         FROM orders o JOIN shops s ON s.id = o.shop_id
         WHERE o.user_id = ?
         ORDER BY o.created DESC, o.id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("failed to list order history")
}

pub async fn order_stats(pool: &SqlitePool, user_id: i64) -> Result<OrderStats> {
    sqlx::query_as::<_, OrderStats>(
        "SELECT COUNT(*) AS orders_qty, COALESCE(SUM(amount), 0) AS total
         FROM orders WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .context("failed to read order stats")
}

pub async fn set_order_status(pool: &SqlitePool, order_id: i64, status: OrderStatus) -> Result<()> {
    sqlx::query("UPDATE orders SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(order_id)
        .execute(pool)
        .await
        .context("failed to update order status")?;

    info!(order_id, status = status.as_str(), "order status updated");
    Ok(())
}

// ── payments ─────────────────────────────────────────────────────────────

pub async fn create_payment(pool: &SqlitePool, user_id: i64, amount: f64) -> Result<i64> {
    let payment_id = sqlx::query("INSERT INTO payments (user_id, amount) VALUES (?, ?)")
        .bind(user_id)
        .bind(amount)
        .execute(pool)
        .await
        .context("failed to insert payment")?
        .last_insert_rowid();

    info!(user_id, amount, payment_id, "payment recorded");
    Ok(payment_id)
}

// ── questions (FAQ) ──────────────────────────────────────────────────────

pub async fn list_questions(pool: &SqlitePool) -> Result<Vec<Question>> {
    sqlx::query_as::<_, Question>("SELECT * FROM questions ORDER BY id")
        .fetch_all(pool)
        .await
        .context("failed to list questions")
}

pub async fn get_question(pool: &SqlitePool, question_id: i64) -> Result<Option<Question>> {
    sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = ?")
        .bind(question_id)
        .fetch_optional(pool)
        .await
        .context("failed to read question")
}

// ── posts (broadcast queue) ──────────────────────────────────────────────

/// Queued posts in creation order.
pub async fn list_queued_posts(pool: &SqlitePool) -> Result<Vec<Post>> {
    sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE status = ? ORDER BY created, id")
        .bind(POST_WAIT)
        .fetch_all(pool)
        .await
        .context("failed to list queued posts")
}

pub async fn mark_post_sending(pool: &SqlitePool, post_id: i64) -> Result<()> {
    sqlx::query("UPDATE posts SET status = ? WHERE id = ?")
        .bind(POST_SENDING)
        .bind(post_id)
        .execute(pool)
        .await
        .context("failed to mark post sending")?;
    Ok(())
}

pub async fn mark_post_done(pool: &SqlitePool, post_id: i64, receivers: i64) -> Result<()> {
    sqlx::query("UPDATE posts SET status = ?, receivers = ? WHERE id = ?")
        .bind(POST_DONE)
        .bind(receivers)
        .bind(post_id)
        .execute(pool)
        .await
        .context("failed to mark post done")?;
    Ok(())
}

// ── logs (interaction audit) ─────────────────────────────────────────────

pub async fn create_log(pool: &SqlitePool, user_id: i64, kind: &str, content: &str) -> Result<()> {
    sqlx::query("INSERT INTO logs (user_id, kind, content) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(kind)
        .bind(content)
        .execute(pool)
        .await
        .context("failed to insert log entry")?;
    Ok(())
}
