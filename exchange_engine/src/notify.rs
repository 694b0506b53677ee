//! Outbound notifications raised while intents are processed.
//!
//! The engine never talks to the chat platform itself. It hands human-readable messages to a
//! [`Notifier`] and moves on; delivery problems are the dispatcher's to log and retry. Nothing in
//! the lifecycle ever fails because a notification could not be sent.

use std::future::Future;

use crate::db_types::Role;

/// The futures must be `Send` so that the shift scheduler can run notifiers from a spawned task.
pub trait Notifier: Clone {
    /// Announces something to every partner group.
    fn broadcast_to_groups(&self, message: &str) -> impl Future<Output = ()> + Send;

    /// Raises something for the staff channel: control requests, anomalies, invoice summaries.
    fn notify_admins(&self, message: &str) -> impl Future<Output = ()> + Send;

    /// Direct-messages every staff member holding the given role.
    fn notify_role(&self, role: Role, message: &str) -> impl Future<Output = ()> + Send;
}

/// Swallows every notification. Useful for maintenance tooling and tests that only exercise state.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    async fn broadcast_to_groups(&self, _message: &str) {}

    async fn notify_admins(&self, _message: &str) {}

    async fn notify_role(&self, _role: Role, _message: &str) {}
}
