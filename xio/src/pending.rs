//! Queue of outbound messages waiting for the transport.

use std::collections::VecDeque;
use std::fmt;

use tracing::info;

use crate::adapter::XioAdapter;
use crate::types::SendResult;

pub type OnSendComplete = Box<dyn FnOnce(SendResult)>;

/// A queued message with its own copy of the caller's bytes.
pub(crate) struct PendingTransmission {
    bytes: Vec<u8>,
    unsent_size: usize,
    on_send_complete: OnSendComplete,
}

impl PendingTransmission {
    pub(crate) fn new(buffer: &[u8], on_send_complete: OnSendComplete) -> Self {
        Self {
            bytes: buffer.to_vec(),
            unsent_size: buffer.len(),
            on_send_complete,
        }
    }

    pub(crate) fn total_size(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn unsent_size(&self) -> usize {
        self.unsent_size
    }

    fn unsent(&self) -> &[u8] {
        &self.bytes[self.bytes.len() - self.unsent_size..]
    }

    /// Fire the stored callback and release the buffer.
    pub(crate) fn complete(self, result: SendResult) {
        let PendingTransmission {
            bytes,
            on_send_complete,
            ..
        } = self;
        on_send_complete(result);
        drop(bytes);
    }
}

impl fmt::Debug for PendingTransmission {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PendingTransmission")
            .field("total_size", &self.total_size())
            .field("unsent_size", &self.unsent_size())
            .finish()
    }
}

/// What one drain attempt did with the head of the queue.
#[derive(Debug)]
pub(crate) enum Drain {
    /// Nothing queued.
    Empty,
    /// The transport took nothing; the head stays queued.
    Waiting,
    /// The transport took part of the head; the rest goes on a later poll.
    Partial,
    /// The head was fully transmitted and dequeued.
    Sent(PendingTransmission),
    /// The transport failed; the head was dequeued unsent.
    Failed(PendingTransmission),
}

#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    queue: VecDeque<PendingTransmission>,
}

impl PendingQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, message: PendingTransmission) {
        self.queue.push_back(message);
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    /// Offer the unsent suffix of the head message to `adapter` once.
    pub(crate) fn drain_head<A: XioAdapter + ?Sized>(&mut self, adapter: &mut A) -> Drain {
        let head = match self.queue.front_mut() {
            Some(head) => head,
            None => return Drain::Empty,
        };

        match adapter.write(head.unsent()) {
            Ok(0) => Drain::Waiting,
            Ok(n) => {
                head.unsent_size -= n.min(head.unsent_size);
                if head.unsent_size == 0 {
                    self.pop_into(Drain::Sent)
                } else {
                    Drain::Partial
                }
            }
            Err(e) => {
                info!("Unrecoverable error from adapter write: {}", e);
                self.pop_into(Drain::Failed)
            }
        }
    }

    fn pop_into(&mut self, f: fn(PendingTransmission) -> Drain) -> Drain {
        match self.queue.pop_front() {
            Some(message) => f(message),
            None => Drain::Empty,
        }
    }

    /// Dequeue every message in FIFO order, completing each as cancelled.
    pub(crate) fn cancel_all(&mut self) {
        while let Some(message) = self.queue.pop_front() {
            message.complete(SendResult::Cancelled);
        }
    }
}
