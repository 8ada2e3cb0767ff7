//! Notification port.
//!
//! The core only asks a notifier to deliver a message; templates, queueing
//! and retries live behind the implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::CustomerId;

use crate::error::ReconcileError;

/// Trait for customer notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers a message to a customer. Callers treat failures as
    /// non-fatal and only log them.
    async fn notify(
        &self,
        customer_id: CustomerId,
        subject: &str,
        body: &str,
    ) -> Result<(), ReconcileError>;
}

/// Notifier that writes messages to the log. The default until a real
/// delivery channel is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        customer_id: CustomerId,
        subject: &str,
        body: &str,
    ) -> Result<(), ReconcileError> {
        tracing::info!(%customer_id, subject, body, "customer notification");
        Ok(())
    }
}

/// Notifier that records messages in memory, for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<RwLock<Vec<(CustomerId, String)>>>,
}

impl RecordingNotifier {
    /// Creates a new recording notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of delivered messages.
    pub fn message_count(&self) -> usize {
        self.messages.read().unwrap().len()
    }

    /// Returns the subjects delivered, in order.
    pub fn subjects(&self) -> Vec<String> {
        self.messages
            .read()
            .unwrap()
            .iter()
            .map(|(_, subject)| subject.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        customer_id: CustomerId,
        subject: &str,
        _body: &str,
    ) -> Result<(), ReconcileError> {
        self.messages
            .write()
            .unwrap()
            .push((customer_id, subject.to_string()));
        Ok(())
    }
}
