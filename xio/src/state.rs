//! The poll driven IO state machine.
//!
//! [`IoStateMachine`] owns one [`XioAdapter`] and a queue of pending
//! transmissions, and turns the adapter's non-blocking primitives into an
//! open/send/close object. Nothing here blocks: the caller drives all
//! progress by calling [`IoStateMachine::dowork`] repeatedly.
//!
//! Callbacks fire synchronously from inside `dowork`, `send`, `close` or
//! `destroy`. The state is always updated before a callback runs.

use tracing::{debug, error, info};

use crate::adapter::{CreateAdapter, OnBytesReceived, XioAdapter};
use crate::error::*;
use crate::options::{OptionSet, OptionValue};
use crate::pending::{Drain, PendingQueue, PendingTransmission};
use crate::types::{AsyncResult, OpenResult, SendResult, XioState};

type OnOpenComplete = Box<dyn FnOnce(OpenResult)>;
type OnIoError = Box<dyn FnMut()>;
type OnCloseComplete = Box<dyn FnOnce()>;

/// Open/send/close object over a single transport adapter.
///
/// # Example
///
/// ```no_run
/// use xio::{EndpointConfig, IoStateMachine, OpenResult, SocketAdapter, XioState};
///
/// let mut xio = IoStateMachine::create::<SocketAdapter>(EndpointConfig::new("localhost", 7))?;
///
/// xio.open(
///     |result| assert_eq!(result, OpenResult::Ok),
///     |bytes| println!("received {} bytes", bytes.len()),
///     || eprintln!("io error"),
/// )?;
///
/// while xio.state() == XioState::Opening {
///     xio.dowork();
/// }
///
/// xio.send(b"hello", |result| println!("send: {:?}", result))?;
/// xio.dowork();
/// # Ok::<(), xio::Error>(())
/// ```
pub struct IoStateMachine {
    state: XioState,
    adapter: Box<dyn XioAdapter>,
    pending: PendingQueue,
    on_open_complete: Option<OnOpenComplete>,
    on_bytes_received: Option<OnBytesReceived>,
    on_io_error: Option<OnIoError>,
    on_close_complete: Option<OnCloseComplete>,
}

impl IoStateMachine {
    /// Create the adapter from `params` and wrap it.
    pub fn create<A: CreateAdapter + 'static>(params: A::Params) -> Result<Self> {
        let adapter = A::create(params).map_err(|e| {
            error!("Failed adapter create: {}", e);
            e
        })?;
        Ok(Self::with_adapter(Box::new(adapter)))
    }

    pub fn with_adapter(adapter: Box<dyn XioAdapter>) -> Self {
        Self {
            state: XioState::Initial,
            adapter,
            pending: PendingQueue::new(),
            on_open_complete: None,
            on_bytes_received: None,
            on_io_error: None,
            on_close_complete: None,
        }
    }

    pub fn state(&self) -> XioState {
        self.state
    }

    /// Number of messages still waiting to be fully transmitted.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Record the callbacks and start opening.
    ///
    /// No I/O happens here; the adapter's open is polled from `dowork`.
    /// Returns an error, without calling anything, unless the machine is in
    /// [`XioState::Initial`].
    pub fn open<O, R, E>(
        &mut self,
        on_open_complete: O,
        on_bytes_received: R,
        on_io_error: E,
    ) -> Result<()>
    where
        O: FnOnce(OpenResult) + 'static,
        R: FnMut(&[u8]) + 'static,
        E: FnMut() + 'static,
    {
        if self.state != XioState::Initial {
            error!("Invalid state {:?}. Expected state is Initial.", self.state);
            return Err(Error::invalid_state("open", self.state));
        }

        self.on_open_complete = Some(Box::new(on_open_complete));
        self.on_bytes_received = Some(OnBytesReceived::new(on_bytes_received));
        self.on_io_error = Some(Box::new(on_io_error));
        self.set_state(XioState::Opening);
        Ok(())
    }

    /// Start closing.
    ///
    /// While opening, the open-complete callback first fires with
    /// [`OpenResult::Cancelled`]. The adapter's close is attempted right
    /// away and then from every `dowork` until it finishes, at which point
    /// unsent messages are cancelled and `on_close_complete` fires.
    ///
    /// Closing an already closing or closed machine does nothing.
    pub fn close<C>(&mut self, on_close_complete: C) -> Result<()>
    where
        C: FnOnce() + 'static,
    {
        match self.state {
            XioState::Initial => {
                error!("close called before open");
                Err(Error::invalid_state("close", self.state))
            }
            XioState::Closing | XioState::Closed => Ok(()),
            XioState::Opening | XioState::Open | XioState::Error => {
                if self.state == XioState::Opening {
                    self.cancel_open();
                }
                self.on_close_complete = Some(Box::new(on_close_complete));
                self.set_state(XioState::Closing);
                self.dowork_close(false);
                Ok(())
            }
        }
    }

    /// Queue a copy of `buffer` for transmission and try to send it at once.
    ///
    /// `on_send_complete` fires exactly once: with [`SendResult::Ok`] after
    /// the last byte is accepted, [`SendResult::Error`] if the transport
    /// fails first, or [`SendResult::Cancelled`] if the machine is closed
    /// or destroyed with the message still queued. When this returns an
    /// error the callback is never called.
    pub fn send<F>(&mut self, buffer: &[u8], on_send_complete: F) -> Result<()>
    where
        F: FnOnce(SendResult) + 'static,
    {
        if buffer.is_empty() || buffer.len() >= i32::MAX as usize {
            error!("Invalid buffer size {}", buffer.len());
            return Err(Error::InvalidParameter("buffer".into()));
        }
        if self.state != XioState::Open {
            error!("send without a prior successful open");
            return Err(Error::invalid_state("send", self.state));
        }

        self.pending
            .push(PendingTransmission::new(buffer, Box::new(on_send_complete)));
        self.dowork_send();
        Ok(())
    }

    /// Advance whatever is in progress by one step.
    pub fn dowork(&mut self) {
        match self.state {
            XioState::Initial | XioState::Closed | XioState::Error => {}
            XioState::Opening => self.dowork_poll_open(),
            XioState::Open => {
                self.dowork_read();
                if self.state == XioState::Open {
                    self.dowork_send();
                }
            }
            XioState::Closing => self.dowork_close(false),
        }
    }

    pub fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<()> {
        self.adapter.set_option(name, value).map_err(|e| {
            error!("Failed set_option '{}': {}", name, e);
            e
        })
    }

    pub fn retrieve_options(&self) -> OptionSet {
        self.adapter.retrieve_options()
    }

    /// Finish any open session and release the adapter.
    ///
    /// Dropping the machine does the same.
    pub fn destroy(self) {}

    fn set_state(&mut self, state: XioState) {
        if self.state != state {
            debug!("xio state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn cancel_open(&mut self) {
        self.set_state(XioState::Closing);
        if let Some(on_open_complete) = self.on_open_complete.take() {
            on_open_complete(OpenResult::Cancelled);
        }
    }

    fn enter_error(&mut self) {
        if self.state != XioState::Error {
            self.set_state(XioState::Error);
            if let Some(on_io_error) = self.on_io_error.as_mut() {
                on_io_error();
            }
        }
    }

    fn dowork_poll_open(&mut self) {
        let on_received = match self.on_bytes_received {
            Some(ref cb) => cb.clone(),
            None => return,
        };

        match self.adapter.open(&on_received) {
            AsyncResult::Success => {
                self.set_state(XioState::Open);
                if let Some(on_open_complete) = self.on_open_complete.take() {
                    on_open_complete(OpenResult::Ok);
                }
            }
            AsyncResult::Failure => {
                error!("Adapter open failed");
                self.set_state(XioState::Error);
                if let Some(on_open_complete) = self.on_open_complete.take() {
                    on_open_complete(OpenResult::Error);
                }
            }
            AsyncResult::Waiting => {}
        }
    }

    fn dowork_read(&mut self) {
        let mut result = self.adapter.read();
        while result == AsyncResult::Success {
            result = self.adapter.read();
        }
        if result == AsyncResult::Failure {
            info!("Communications error while reading");
            self.enter_error();
        }
    }

    fn dowork_send(&mut self) {
        match self.pending.drain_head(&mut *self.adapter) {
            Drain::Sent(message) => message.complete(SendResult::Ok),
            Drain::Failed(message) => {
                self.enter_error();
                message.complete(SendResult::Error);
            }
            Drain::Empty | Drain::Waiting | Drain::Partial => {}
        }
    }

    /// Poll the adapter's close once. With `force` the close is finished
    /// even while the adapter is still waiting.
    fn dowork_close(&mut self, force: bool) {
        let result = self.adapter.close();
        if !result.is_waiting() || force {
            self.set_state(XioState::Closed);
            if result == AsyncResult::Failure {
                error!("Adapter close failed");
            }

            self.pending.cancel_all();

            self.on_bytes_received = None;
            self.on_io_error = None;
            self.on_open_complete = None;
            if let Some(on_close_complete) = self.on_close_complete.take() {
                on_close_complete();
            }
        }
    }
}

impl Drop for IoStateMachine {
    fn drop(&mut self) {
        match self.state {
            XioState::Opening | XioState::Open | XioState::Closing | XioState::Error => {
                if self.state == XioState::Opening {
                    self.cancel_open();
                }
                self.dowork_close(true);
            }
            XioState::Initial | XioState::Closed => {}
        }
    }
}
