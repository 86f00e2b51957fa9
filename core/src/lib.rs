//! Memo Mingle library
//!
//! Decks of rich-text cards and quick memos kept in sync with a document
//! store through live queries. The view layer drives it through
//! [`commands`] and renders whatever the live views publish.

pub mod app;
pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod identity;
pub mod models;
pub mod services;
pub mod slug;
pub mod store;
