//! # jailctl-core
//!
//! Low-level jail primitives for the jailctl runtime.
//!
//! This crate provides safe abstractions over:
//! - **Registry**: the kernel's versioned jail record stream, decoded into
//!   typed [`Container`](jailctl_common::types::Container) values.
//! - **Processes**: point-in-time process snapshots from the kernel or procfs.
//! - **Membership**: which jail a process belongs to, read from its status file.
//! - **Signals**: delivery that treats an already exited target as success.
//! - **Context**: attaching the calling process to a jail.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! `// SAFETY:` documentation.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod context;
pub mod membership;
pub mod process;
pub mod registry;
pub mod signal;

#[cfg(target_os = "freebsd")]
mod sysctl;
