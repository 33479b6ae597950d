//! Decoding of individual jail records.
//!
//! The kernel hands out a buffer of back-to-back records, each starting
//! with a structure version tag. Every known version has a fixed header
//! layout; version 3 is additionally followed by a variable number of
//! address blocks whose total size is given in its header.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;

use jailctl_common::error::{JailError, Result};
use jailctl_common::types::{Container, JailId};

/// Size of a path field in a record.
pub const MAXPATHLEN: usize = 1024;
/// Size of a hostname field in a record.
pub const MAXHOSTNAMELEN: usize = 256;
/// Size of the leading version tag.
pub const TAG_LEN: usize = 4;

const IPV4_LEN: usize = 4;
const IPV6_LEN: usize = 16;

/// Record structure versions this build knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordVersion {
    /// Single IPv4 address, fixed size.
    V1,
    /// Same layout as [`RecordVersion::V1`].
    V2,
    /// Header followed by IPv4 and IPv6 address blocks.
    V3,
}

impl RecordVersion {
    /// The version the running kernel is expected to produce.
    pub const NATIVE: Self = Self::V3;

    /// Maps a raw tag to a known version.
    #[must_use]
    pub const fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            _ => None,
        }
    }

    /// Returns the raw tag value.
    #[must_use]
    pub const fn tag(self) -> i32 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
            Self::V3 => 3,
        }
    }

    /// Returns the size of the fixed part of a record.
    #[must_use]
    pub const fn header_len(self) -> usize {
        match self {
            // version, id, path, host, ip
            Self::V1 | Self::V2 => 4 + 4 + MAXPATHLEN + MAXHOSTNAMELEN + 4,
            // version, id, state, cpuset, path, host, name, ip4s, ip6s
            Self::V3 => 4 * 4 + MAXPATHLEN + 2 * MAXHOSTNAMELEN + 4 + 4,
        }
    }
}

/// A decoded record and the number of bytes it occupied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Structure version the record was tagged with.
    pub version: RecordVersion,
    /// Decoded jail.
    pub container: Container,
    /// Total encoded length, trailing address blocks included.
    pub encoded_len: usize,
}

/// Reads the version tag at the start of `buf`, if there is room for one.
#[must_use]
pub fn read_tag(buf: &[u8]) -> Option<i32> {
    buf.get(..TAG_LEN)
        .and_then(|b| b.try_into().ok())
        .map(i32::from_ne_bytes)
}

/// Decodes the record at the start of `buf`.
///
/// Returns `Ok(None)` when the buffer ends before the record does, which
/// marks the end of the stream.
///
/// # Errors
///
/// Returns [`JailError::VersionSkew`] for an unknown version tag or a
/// record whose id is not a valid jail id.
pub fn decode(buf: &[u8]) -> Result<Option<Record>> {
    let Some(tag) = read_tag(buf) else {
        return Ok(None);
    };
    let version = RecordVersion::from_tag(tag).ok_or_else(|| JailError::VersionSkew {
        message: format!("unknown version of jail structure: {tag}"),
    })?;
    let Some(header) = buf.get(..version.header_len()) else {
        return Ok(None);
    };

    let mut fields = Fields::new(header);
    let _ = fields.i32();
    let raw_id = fields.i32();
    let id = u32::try_from(raw_id)
        .ok()
        .and_then(JailId::new)
        .ok_or_else(|| JailError::VersionSkew {
            message: format!("jail record carries invalid id {raw_id}"),
        })?;

    match version {
        RecordVersion::V1 | RecordVersion::V2 => {
            let path = fields.c_string(MAXPATHLEN);
            let hostname = fields.c_string(MAXHOSTNAMELEN);
            let ip = Ipv4Addr::from(fields.u32());
            Ok(Some(Record {
                version,
                container: Container {
                    id,
                    hostname,
                    path: PathBuf::from(path),
                    addresses: vec![IpAddr::V4(ip)],
                },
                encoded_len: version.header_len(),
            }))
        }
        RecordVersion::V3 => {
            let _state = fields.i32();
            let _cpuset = fields.i32();
            let path = fields.c_string(MAXPATHLEN);
            let hostname = fields.c_string(MAXHOSTNAMELEN);
            let _name = fields.c_string(MAXHOSTNAMELEN);
            let ip4s = fields.u32() as usize;
            let ip6s = fields.u32() as usize;

            let Some(trailing) = ip4s
                .checked_mul(IPV4_LEN)
                .zip(ip6s.checked_mul(IPV6_LEN))
                .and_then(|(a, b)| a.checked_add(b))
            else {
                return Ok(None);
            };
            let Some(encoded_len) = version.header_len().checked_add(trailing) else {
                return Ok(None);
            };
            let Some(blocks) = buf.get(version.header_len()..encoded_len) else {
                return Ok(None);
            };

            let (v4, v6) = blocks.split_at(ip4s * IPV4_LEN);
            let addresses = v4
                .chunks_exact(IPV4_LEN)
                .filter_map(|c| <[u8; IPV4_LEN]>::try_from(c).ok())
                .map(|o| IpAddr::V4(Ipv4Addr::from(o)))
                .chain(
                    v6.chunks_exact(IPV6_LEN)
                        .filter_map(|c| <[u8; IPV6_LEN]>::try_from(c).ok())
                        .map(|o| IpAddr::V6(Ipv6Addr::from(o))),
                )
                .collect();

            Ok(Some(Record {
                version,
                container: Container {
                    id,
                    hostname,
                    path: PathBuf::from(path),
                    addresses,
                },
                encoded_len,
            }))
        }
    }
}

/// Sequential reader over a header whose length has already been checked.
struct Fields<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> &'a [u8] {
        let end = (self.pos + len).min(self.buf.len());
        let bytes = &self.buf[self.pos.min(end)..end];
        self.pos = end;
        bytes
    }

    fn word(&mut self) -> [u8; 4] {
        self.take(4).try_into().unwrap_or_default()
    }

    fn i32(&mut self) -> i32 {
        i32::from_ne_bytes(self.word())
    }

    fn u32(&mut self) -> u32 {
        u32::from_ne_bytes(self.word())
    }

    /// Reads a fixed-size, NUL-terminated string field.
    fn c_string(&mut self, len: usize) -> String {
        let field = self.take(len);
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        String::from_utf8_lossy(&field[..end]).into_owned()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;

    #[test]
    fn header_sizes_match_kernel_layout() {
        assert_eq!(RecordVersion::V1.header_len(), 1292);
        assert_eq!(RecordVersion::V2.header_len(), 1292);
        assert_eq!(RecordVersion::V3.header_len(), 1560);
    }

    #[test]
    fn decodes_fixed_record() {
        let ip = Ipv4Addr::new(10, 0, 0, 5);
        let buf = fixtures::fixed(RecordVersion::V1, 4, "www", "/jails/www", ip);
        let rec = decode(&buf).unwrap().unwrap();
        assert_eq!(rec.version, RecordVersion::V1);
        assert_eq!(rec.encoded_len, 1292);
        assert_eq!(rec.container.id.get(), 4);
        assert_eq!(rec.container.hostname, "www");
        assert_eq!(rec.container.path, PathBuf::from("/jails/www"));
        assert_eq!(rec.container.addresses, vec![IpAddr::V4(ip)]);
    }

    #[test]
    fn v3_length_includes_address_blocks() {
        let v4 = [Ipv4Addr::new(192, 168, 1, 2), Ipv4Addr::new(192, 168, 1, 3)];
        let v6 = [Ipv6Addr::LOCALHOST];
        let buf = fixtures::v3(9, "db", "/jails/db", &v4, &v6);
        let rec = decode(&buf).unwrap().unwrap();
        assert_eq!(rec.encoded_len, 1560 + 2 * 4 + 16);
        assert_eq!(rec.container.addresses.len(), 3);
        assert_eq!(rec.container.addresses[2], IpAddr::V6(Ipv6Addr::LOCALHOST));
    }

    #[test]
    fn truncated_address_blocks_end_the_stream() {
        let buf = fixtures::v3(9, "db", "/jails/db", &[Ipv4Addr::LOCALHOST], &[]);
        assert!(decode(&buf[..buf.len() - 1]).unwrap().is_none());
    }

    #[test]
    fn truncated_header_ends_the_stream() {
        let buf = fixtures::fixed(RecordVersion::V2, 1, "a", "/a", Ipv4Addr::LOCALHOST);
        assert!(decode(&buf[..100]).unwrap().is_none());
        assert!(decode(&buf[..2]).unwrap().is_none());
    }

    #[test]
    fn unknown_version_is_skew() {
        let mut buf = fixtures::fixed(RecordVersion::V1, 1, "a", "/a", Ipv4Addr::LOCALHOST);
        buf[..4].copy_from_slice(&7i32.to_ne_bytes());
        assert!(matches!(decode(&buf), Err(JailError::VersionSkew { .. })));
    }

    #[test]
    fn zero_id_is_rejected() {
        let buf = fixtures::fixed(RecordVersion::V1, 0, "a", "/a", Ipv4Addr::LOCALHOST);
        assert!(matches!(decode(&buf), Err(JailError::VersionSkew { .. })));
    }
}
