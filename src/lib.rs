//! kvmux - a multiplexed client for key-value engines
//!
//! ```no_run
//! use kvmux::{SessionBuilder, Transaction};
//!
//! # async fn demo() -> kvmux::DriverResult<()> {
//! let session = SessionBuilder::new("127.0.0.1:6379")
//!     .client_name("demo")
//!     .connect()
//!     .await?;
//!
//! session.set("counter", "1").await?;
//!
//! let mut tx = Transaction::new();
//! tx.incr("counter")?.get("counter")?;
//! match session.exec_transaction(&mut tx).await? {
//!     Some(results) => println!("{:?}", results),
//!     None => println!("aborted"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;

pub use config::SessionConfig;
pub use driver::protocol::{Command, ProtocolVersion, Value};
pub use driver::{CallbackRegistry, Session, SessionBuilder, Transaction, TransactionState};
pub use error::{DriverError, DriverResult};
