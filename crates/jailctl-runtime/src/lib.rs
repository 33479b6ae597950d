//! Jail shutdown orchestration for the jailctl runtime.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod engine;
pub mod exec;
pub mod host;
pub mod shutdown;
pub mod supervisor;
pub mod worker;
