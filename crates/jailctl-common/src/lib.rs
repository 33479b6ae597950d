//! # jailctl-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the jailctl workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and provides the vocabulary the kernel-facing primitives
//! and the shutdown runtime are written in.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
