//! GearGuard: a maintenance management backend.
//!
//! Tracks equipment, maintenance teams, and repair requests behind a
//! token-authenticated REST API backed by SQLite.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod server;
