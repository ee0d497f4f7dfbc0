//! # Orderdesk
//!
//! A Telegram storefront bot: users place orders through a guided
//! conversation, browse shops and history, and pay invoices issued
//! through an external payment provider. Broadcast posts are delivered
//! by a background sender task.

pub mod audit;
pub mod bot;
pub mod callback;
pub mod config;
pub mod db;
pub mod flow;
pub mod outbound;
pub mod payment;
pub mod registry;
pub mod sender;
pub mod texts;
