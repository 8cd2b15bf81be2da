//! Newsdesk - content automation backend for a personal portfolio
//!
//! RSS ingestion with AI pre-moderation, human review through an admin API
//! and a Telegram bot, cross-posting to social networks, a blog and a
//! contact form.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod scheduler;
pub mod services;
