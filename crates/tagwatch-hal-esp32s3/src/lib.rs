//! ESP32-S3 bindings for the tagwatch core seams.

#![cfg_attr(not(test), no_std)]

pub mod clock;
pub mod power;
pub mod serial;
pub mod status;
pub mod storage;
