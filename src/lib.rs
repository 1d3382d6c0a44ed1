//! Discourse Hotness Crawler library.
//!
//! Incrementally crawls Discourse forum boards, stores topics, posts, and
//! users in SQLite, and ranks topics with a time-decayed hotness score.

pub mod config;
pub mod constants;
pub mod content;
pub mod crawler;
pub mod db;
pub mod hotness;
