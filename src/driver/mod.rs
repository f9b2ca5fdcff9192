//! Multiplexed request/response driver
//!
//! Many callers share one connection. Each request carries a callback index
//! allocated by the [`CallbackRegistry`]; replies may come back in any order
//! and are routed to their caller by that index.
//!
//! # Protocol Overview
//!
//! - **Request Frame**: `[length: 4 bytes BE][msgpack Request]`
//! - **Response Frame**: `[length: 4 bytes BE][msgpack Response]`
//!
//! Frames are packed back to back on the stream. A transaction travels as a
//! single batch request and is answered by a single response.

pub mod client;
pub mod protocol;
pub mod registry;
pub mod transaction;

pub use client::{Session, SessionBuilder};
pub use registry::{CallbackRegistry, Registration};
pub use transaction::{Transaction, TransactionState};
