//! apdurun transport
//!
//! Blocking device I/O on top of `apdurun-core`.
//!
//! This crate provides:
//! - The [`Transport`] trait and a TCP [`ProxyTransport`] for emulators and proxies
//! - The deployed-secret key exchange that opens the secure channel
//! - [`SecureSession`], which wraps frames in the channel, and [`run_script`]
//!
//! # Hard Failures
//!
//! Any error (malformed line, bad status word, channel desynchronization,
//! lost socket) ends the run. There is no retry: the chained IV has already
//! moved and a repeated exchange would not match what the device expects.
//!
//! Everything is single-threaded and strictly sequential. One frame is in
//! flight at a time.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod config;
pub mod deployed;
pub mod device;
pub mod error;
pub mod proxy;
pub mod script;
pub mod session;

pub use config::TransportConfig;
pub use deployed::{DeployedSecret, SecretDeriver};
pub use device::Transport;
pub use error::TransportError;
pub use proxy::ProxyTransport;
pub use script::{run_script, ScriptSummary};
pub use session::SecureSession;
