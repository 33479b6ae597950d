//! The kernel's table of live jails.
//!
//! A [`JailRegistry`] captures one copy of the record stream. It is a
//! point-in-time view: to notice jails created or removed since, load a
//! new registry. Each iterator walks the captured buffer exactly once.

pub mod record;
pub mod source;

use std::iter::FusedIterator;

use jailctl_common::error::{JailError, Result};
use jailctl_common::types::{Container, JailId, JailKey};

use self::record::RecordVersion;
pub use self::source::{Fetch, RecordSource, SysctlJailList};

/// A captured copy of the kernel's jail record stream.
///
/// The buffer is zeroed when the registry is released or dropped.
#[derive(Debug)]
pub struct JailRegistry {
    data: Vec<u8>,
    version: RecordVersion,
}

impl JailRegistry {
    /// Fetches the current record stream, expecting this build's native
    /// record version.
    ///
    /// # Errors
    ///
    /// Returns [`JailError::KernelQuery`] if the fetch fails and
    /// [`JailError::VersionSkew`] if the stream does not start with a
    /// native record.
    pub fn load(source: &dyn RecordSource) -> Result<Self> {
        Self::load_expecting(source, RecordVersion::NATIVE)
    }

    /// Fetches the current record stream, expecting `version` records.
    ///
    /// The stream can grow between sizing the buffer and filling it; in
    /// that case the size is queried again and the fetch retried.
    ///
    /// # Errors
    ///
    /// Same as [`JailRegistry::load`].
    pub fn load_expecting(source: &dyn RecordSource, version: RecordVersion) -> Result<Self> {
        loop {
            let len = source.required_len()?;
            if len == 0 {
                return Self::from_bytes(Vec::new(), version);
            }
            let mut data = vec![0u8; len];
            match source.fetch(&mut data)? {
                Fetch::Filled(written) => {
                    data.truncate(written);
                    tracing::debug!(bytes = written, "jail list captured");
                    return Self::from_bytes(data, version);
                }
                Fetch::TooSmall => {
                    tracing::debug!(len, "jail list grew while fetching, retrying");
                }
            }
        }
    }

    /// Wraps an already captured stream after validating its first record.
    ///
    /// # Errors
    ///
    /// Returns [`JailError::VersionSkew`] if a non-empty stream is shorter
    /// than one record header or its first record is not `version`.
    pub fn from_bytes(data: Vec<u8>, version: RecordVersion) -> Result<Self> {
        if !data.is_empty() {
            let tag = record::read_tag(&data);
            if tag != Some(version.tag()) || data.len() < version.header_len() {
                return Err(JailError::VersionSkew {
                    message: format!(
                        "jail list of {} bytes does not start with a version {} record",
                        data.len(),
                        version.tag()
                    ),
                });
            }
        }
        Ok(Self { data, version })
    }

    /// Returns a single-pass iterator over the captured jails.
    ///
    /// Every record must carry the registry's version. The first record
    /// that does not yields a [`JailError::VersionSkew`] and ends the
    /// iteration.
    #[must_use]
    pub fn iter(&self) -> Records<'_> {
        Records {
            data: &self.data,
            offset: 0,
            version: self.version,
            done: false,
        }
    }

    /// Finds a jail by numeric id or hostname.
    ///
    /// # Errors
    ///
    /// Returns [`JailError::InvalidId`] for a numeric key that is not a
    /// positive id, or any error raised while walking the records.
    pub fn find(&self, key: &str) -> Result<Option<Container>> {
        self.find_key(&key.parse()?)
    }

    /// Finds a jail by an already parsed key.
    ///
    /// An id key only ever matches ids, a name key only ever matches
    /// hostnames.
    ///
    /// # Errors
    ///
    /// Returns any error raised while walking the records.
    pub fn find_key(&self, key: &JailKey) -> Result<Option<Container>> {
        for container in self.iter() {
            let container = container?;
            let hit = match key {
                JailKey::Id(id) => container.id == *id,
                JailKey::Name(name) => container.hostname == *name,
            };
            if hit {
                return Ok(Some(container));
            }
        }
        Ok(None)
    }

    /// Frees the captured buffer.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for JailRegistry {
    fn drop(&mut self) {
        self.data.fill(0);
    }
}

impl<'a> IntoIterator for &'a JailRegistry {
    type Item = Result<Container>;
    type IntoIter = Records<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the records of a [`JailRegistry`].
#[derive(Debug)]
pub struct Records<'a> {
    data: &'a [u8],
    offset: usize,
    version: RecordVersion,
    done: bool,
}

impl Iterator for Records<'_> {
    type Item = Result<Container>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let rest = self.data.get(self.offset..).unwrap_or_default();
        match record::decode(rest) {
            Ok(Some(rec)) if rec.version == self.version => {
                self.offset += rec.encoded_len;
                Some(Ok(rec.container))
            }
            Ok(Some(rec)) => {
                self.done = true;
                Some(Err(JailError::VersionSkew {
                    message: format!(
                        "jail record version {} where {} was expected",
                        rec.version.tag(),
                        self.version.tag()
                    ),
                }))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for Records<'_> {}

/// Resolves a name or id to the jail's numeric id using a fresh registry.
///
/// # Errors
///
/// Returns [`JailError::UnknownContainer`] if nothing matches, or any error
/// raised while loading or walking the registry.
pub fn translate(source: &dyn RecordSource, key: &str) -> Result<JailId> {
    let registry = JailRegistry::load(source)?;
    let found = registry.find(key)?;
    registry.release();
    found
        .map(|c| c.id)
        .ok_or_else(|| JailError::UnknownContainer { key: key.into() })
}
