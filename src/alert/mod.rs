pub mod cooldown;
pub mod engine;
pub mod formatting;
pub mod sink;

pub use cooldown::CooldownTable;
pub use engine::AlertEngine;
pub use sink::{ChatSink, TelegramSink};
