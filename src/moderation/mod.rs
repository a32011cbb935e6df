pub mod service;

pub use service::{ModerationService, ModeratorPredicate, Reported};
