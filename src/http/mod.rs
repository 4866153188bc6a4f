//! JSON HTTP API over the annunciator.
//!
//! Handlers only validate and enqueue; playback happens on the sequence
//! player's workers and never holds up a response.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;
