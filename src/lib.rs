//! Run a command with netem network impairment applied to its traffic only.

#![warn(missing_docs)]
#![deny(unused_must_use)]
#![warn(missing_debug_implementations)]

#[macro_use]
extern crate error_chain;
extern crate libc;
extern crate nix;
#[macro_use]
extern crate serde_derive;
extern crate toml;
extern crate unshare;

mod error;
pub mod command;
pub mod config;
pub mod device;
pub mod netem;
pub mod scope;
pub mod session;
pub mod signal;

#[cfg(test)]
mod test_helpers;

pub use command::{Host, Invocation, Status, System};
pub use config::Configuration;
pub use error::*;
pub use netem::ImpairmentSpec;
pub use session::{execute, Request, Session};
