//! Hardware-independent core of the tagwatch field logger.
//!
//! Everything here builds for the host so the activation/read state machine,
//! the tag frame decoder and the CSV record codec can be tested without a board.

#![cfg_attr(not(test), no_std)]

pub mod clock;
pub mod config;
pub mod frame;
pub mod io;
pub mod machine;
pub mod record;
pub mod session;
