/// Modmail lifecycle: resolution, relay, idle timeouts and closing
pub mod modmail;
/// Per-guild settings persistence
pub mod settings;
