//! Reconciliation — balance-threshold promotion and notification.

pub mod engine;
pub mod notify;

pub use engine::{Engine, SweepStats};
pub use notify::{CompletionNotifier, Notifier};
