//! Cancellation links: observers on the far side of a channel.
//!
//! A link forwards a cancellation notification across a boundary the core
//! does not control (another process, another runtime). The far end can
//! disappear at any time, so delivery failures are reported as [`LinkClosed`]
//! and discarded by the registering token.

use std::sync::mpsc;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("cancellation link is closed")]
pub struct LinkClosed;

/// One-way notification channel to a remote cancellation observer.
pub trait CancelLink: Send {
    fn notify(&self) -> Result<(), LinkClosed>;
}

impl CancelLink for mpsc::Sender<()> {
    fn notify(&self) -> Result<(), LinkClosed> {
        self.send(()).map_err(|_| LinkClosed)
    }
}

impl CancelLink for mpsc::SyncSender<()> {
    fn notify(&self) -> Result<(), LinkClosed> {
        match self.try_send(()) {
            // A full buffer already holds a pending notification.
            Ok(()) | Err(mpsc::TrySendError::Full(())) => Ok(()),
            Err(mpsc::TrySendError::Disconnected(())) => Err(LinkClosed),
        }
    }
}

impl CancelLink for tokio::sync::mpsc::UnboundedSender<()> {
    fn notify(&self) -> Result<(), LinkClosed> {
        self.send(()).map_err(|_| LinkClosed)
    }
}

impl CancelLink for tokio::sync::watch::Sender<bool> {
    fn notify(&self) -> Result<(), LinkClosed> {
        self.send(true).map_err(|_| LinkClosed)
    }
}
