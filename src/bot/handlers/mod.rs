//! Discord event handlers
//!
//! Non-command traffic: direct messages, staff replies in thread channels and the
//! server selection menu.

/// Gateway event dispatch into the modmail service
pub mod events;

pub use events::event_handler;
