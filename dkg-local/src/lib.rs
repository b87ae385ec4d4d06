#![deny(missing_docs)]
//! An in-memory chain for running DKG coordination without a network.
//!
//! [`LocalChain`] implements [`dkg_core::Chain`] on top of a
//! [`LocalBlockCounter`] that only advances when told to, which makes it
//! usable from tests with paused tokio time.

mod block_counter;
mod chain;

pub use block_counter::LocalBlockCounter;
pub use chain::{LocalChain, Submission};
