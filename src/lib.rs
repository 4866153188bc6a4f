//! annunciator: scheduled and on-demand public-address announcements.
//!
//! Cron-triggered jobs and manual API requests both end up as clip sequences
//! played on a bounded worker pool. The CLI and the HTTP server consume this
//! crate.

pub mod announcement;
pub mod annunciator;
pub mod audio_runtime;
pub mod catalog;
pub mod config;
pub mod cron;
pub mod error;
pub mod http;
pub mod player;
pub mod schedule;
pub mod scheduler;
pub mod sequencer;
pub mod sync;
