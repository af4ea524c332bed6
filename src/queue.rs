//! Bounded FIFO between the caller-facing API and the session worker.
//!
//! # Full-queue policy
//!
//! [`CommandSender::enqueue`] waits for a free slot for at most the configured
//! enqueue timeout, then gives up with [`Error::QueueFull`] and the command is
//! discarded.  This mirrors the bounded wait used by the `get_*` queries: a
//! caller is never blocked indefinitely by a fixture that is out of range.
//!
//! # Disconnect sentinel
//!
//! [`OutboundCommand::Disconnect`] travels through the same queue as real
//! packets so a worker parked in [`CommandReceiver::dequeue`] wakes up even
//! when no traffic is pending.  The worker must check for it before writing.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TryRecvError, TrySendError};

use crate::error::{Error, Result};

/// One entry in the command queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Bytes to write to the control characteristic.
    Packet {
        payload: Vec<u8>,
        /// The fixture answers this command with a notification.
        expects_reply: bool,
    },
    /// Stop marker pushed by `disconnect()`.  Never written to the transport.
    Disconnect,
}

impl OutboundCommand {
    pub fn packet(payload: impl Into<Vec<u8>>) -> Self {
        OutboundCommand::Packet {
            payload: payload.into(),
            expects_reply: false,
        }
    }

    pub fn query(payload: impl Into<Vec<u8>>) -> Self {
        OutboundCommand::Packet {
            payload: payload.into(),
            expects_reply: true,
        }
    }
}

/// Create a queue holding at most `capacity` commands.
pub fn command_queue(
    capacity: usize,
    enqueue_timeout: Duration,
) -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        CommandSender {
            tx,
            capacity,
            enqueue_timeout,
        },
        CommandReceiver { rx },
    )
}

/// Producer half.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<OutboundCommand>,
    capacity: usize,
    enqueue_timeout: Duration,
}

impl CommandSender {
    /// Append a command, waiting up to the enqueue timeout for room.
    pub async fn enqueue(&self, command: OutboundCommand) -> Result<()> {
        match self.tx.send_timeout(command, self.enqueue_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(Error::QueueFull {
                capacity: self.capacity,
            }),
            Err(SendTimeoutError::Closed(_)) => Err(Error::NotConnected),
        }
    }

    /// Append a command only if there is room right now.
    pub fn try_enqueue(&self, command: OutboundCommand) -> Result<()> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => Error::QueueFull {
                capacity: self.capacity,
            },
            TrySendError::Closed(_) => Error::NotConnected,
        })
    }

    /// Append the disconnect sentinel if there is room right now.
    ///
    /// Never waits: a full queue must not hold up a stop.
    pub fn enqueue_disconnect(&self) -> Result<()> {
        self.try_enqueue(OutboundCommand::Disconnect)
    }

    /// Number of commands currently waiting.
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer half, owned by the session worker across reconnects so queued
/// commands survive a comms loss.
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::Receiver<OutboundCommand>,
}

impl CommandReceiver {
    /// Wait for the next command.  `None` once every sender is gone.
    pub async fn dequeue(&mut self) -> Option<OutboundCommand> {
        self.rx.recv().await
    }

    /// Take the next command if one is already waiting.
    pub fn try_dequeue(&mut self) -> Option<OutboundCommand> {
        match self.rx.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}
