//! QuestEngine: the planning conversation that turns a user's request
//! into one or more objectives a session loop can run unattended.

mod blocking;
mod draft;
mod engine;
mod signals;
mod title;

pub use blocking::BlockingContext;
pub use draft::DraftError;
pub use engine::QuestEngine;
pub use signals::{Signal, parse_signals};
pub use title::derive_title;
