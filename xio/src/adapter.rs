//! The contract every transport backend implements.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::*;
use crate::options::{OptionSet, OptionValue};
use crate::types::AsyncResult;

/// Size of the buffer adapters read into before delivering a chunk.
pub const RECEIVE_BUFFER_SIZE: usize = 64;

/// Receive callback handed to an adapter's `open`.
///
/// The adapter keeps a clone and invokes it from `read` for every chunk it
/// pulls off the wire.
#[derive(Clone)]
pub struct OnBytesReceived(Rc<RefCell<dyn FnMut(&[u8])>>);

impl OnBytesReceived {
    pub fn new<F: FnMut(&[u8]) + 'static>(f: F) -> Self {
        OnBytesReceived(Rc::new(RefCell::new(f)))
    }

    pub fn deliver(&self, bytes: &[u8]) {
        (self.0.borrow_mut())(bytes)
    }
}

impl fmt::Debug for OnBytesReceived {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("OnBytesReceived")
    }
}

/// A non-blocking transport.
///
/// None of these calls may block. Anything slow is expressed by returning
/// [`AsyncResult::Waiting`] and finishing on a later call. Releasing the
/// adapter is `Drop`.
pub trait XioAdapter {
    /// Advance toward a connected state. Called repeatedly with the same
    /// callback until it returns `Success` or `Failure`.
    fn open(&mut self, on_received: &OnBytesReceived) -> AsyncResult;

    /// Advance toward a closed state. `Success` and `Failure` both end the
    /// close process.
    fn close(&mut self) -> AsyncResult;

    /// Pull at most one chunk and deliver it through the receive callback.
    /// `Success` means more may be waiting.
    fn read(&mut self) -> AsyncResult;

    /// Offer `buffer` to the transport and return how many bytes it took.
    /// `Ok(0)` means try again later.
    fn write(&mut self, buffer: &[u8]) -> Result<usize>;

    fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<()>;

    fn retrieve_options(&self) -> OptionSet;
}

/// Construction half of the adapter contract.
pub trait CreateAdapter: XioAdapter + Sized {
    type Params;

    /// Validate `params` and build an adapter in its initial state.
    fn create(params: Self::Params) -> Result<Self>;
}
