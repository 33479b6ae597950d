//! Formatted output helpers for CLI commands.

use std::net::IpAddr;

use jailctl_common::types::Container;

/// Header line of `list --long`.
#[must_use]
pub fn long_header() -> String {
    format!("{:>5} {:<24} {:<32} {}", "JID", "HOSTNAME", "PATH", "ADDRESSES")
}

/// One jail as a `list --long` row.
#[must_use]
pub fn long_row(jail: &Container) -> String {
    format!(
        "{:>5} {:<24} {:<32} {}",
        jail.id.get(),
        jail.hostname,
        jail.path.display().to_string(),
        format_addresses(&jail.addresses)
    )
}

/// Joins addresses with commas, `-` when there are none.
#[must_use]
pub fn format_addresses(addresses: &[IpAddr]) -> String {
    if addresses.is_empty() {
        return "-".into();
    }
    addresses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
