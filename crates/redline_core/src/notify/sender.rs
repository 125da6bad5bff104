//! Notification delivery contract.
//!
//! Delivery itself is an external collaborator; the core only defines the
//! call shape and the failure taxonomy the dispatcher has to absorb.

use crate::model::document::{Document, UserRef};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Per-recipient delivery failure.
///
/// None of these abort a batch run; the dispatcher records them and moves
/// on. Retries, if any, are the sender's own business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The send did not finish within the configured per-send timeout.
    Timeout { after: Duration },
    /// The delivery backend refused the notification.
    Rejected(String),
    /// Transport-level failure reaching the delivery backend.
    Transport(String),
}

impl Display for SendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { after } => write!(f, "send timed out after {}ms", after.as_millis()),
            Self::Rejected(detail) => write!(f, "send rejected: {detail}"),
            Self::Transport(detail) => write!(f, "send transport failure: {detail}"),
        }
    }
}

impl Error for SendError {}

/// Delivery interface consumed by the dispatcher.
///
/// Sends are synchronous. The dispatcher bounds each call with the per-send
/// deadline from [`crate::config::DispatchConfig`] and records an overrun as
/// [`SendError::Timeout`]; implementations may additionally enforce their
/// own transport deadlines.
pub trait NotificationSender {
    fn send(&self, recipient: &UserRef, document: &Document) -> Result<(), SendError>;
}

impl<T: NotificationSender + ?Sized> NotificationSender for &T {
    fn send(&self, recipient: &UserRef, document: &Document) -> Result<(), SendError> {
        (**self).send(recipient, document)
    }
}

/// Development sender that logs instead of delivering.
///
/// Backs the CLI when no real delivery backend is wired up.
pub struct LogSender;

impl NotificationSender for LogSender {
    fn send(&self, recipient: &UserRef, document: &Document) -> Result<(), SendError> {
        info!(
            "event=notify_send module=notify status=ok document={} recipient={} contact={}",
            document.uuid, recipient.id, recipient.contact_address
        );
        Ok(())
    }
}
