//! apdurun protocol core
//!
//! Pure, I/O-free building blocks for streaming APDU scripts to a device.
//!
//! This crate provides:
//! - Command frame parsing from hex script lines
//! - The SCP secure channel (AES-128-CBC, `0x80` padding, chained IV)
//! - Root key handling for channel establishment
//!
//! # Invariants
//!
//! - Any protocol error is terminal: the chained IV cannot be rewound
//! - The IV only moves forward, once per encrypt and once per non-empty decrypt
//! - Key material is zeroized on drop
//! - Direct use of `unsafe` is forbidden (#![forbid(unsafe_code)])

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod error;
pub mod frame;
pub mod keys;
pub mod scp;

pub use error::ProtocolError;
pub use frame::CommandFrame;
pub use keys::{RootKey, RootKeyOrigin};
pub use scp::{SecureChannel, SessionKey};
