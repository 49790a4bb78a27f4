// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositor-provided format tables.
//!
//! dma-buf feedback does not send (format, modifier) pairs inline. It sends
//! a file descriptor for a table of fixed-size records once, then refers to
//! records by 16-bit index. Each record is 16 bytes in host byte order:
//!
//! ```text
//!   0       4       8                16
//!   +-------+-------+----------------+
//!   | fourcc|  pad  |    modifier    |
//!   +-------+-------+----------------+
//! ```
//!
//! The memory comes from another process, so every lookup is bounds-checked
//! and a table that could not be mapped is a state, not an error.

use core::fmt;

use crate::error::TableError;
use crate::format::Modifier;

/// Size of one table record in bytes.
pub const RECORD_SIZE: usize = 16;

/// Read-only bytes backing a [`FormatTable`].
///
/// The Wayland backend implements this for a private read-only mapping of
/// the table descriptor. `Vec<u8>` implements it for tables built in memory.
pub trait TableMemory {
    /// The mapped bytes.
    fn bytes(&self) -> &[u8];
}

impl TableMemory for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }
}

/// A format table in one of its three states.
#[derive(Default)]
pub enum FormatTable {
    /// No table has been received.
    #[default]
    Absent,
    /// A table was advertised but could not be mapped.
    Unavailable,
    /// A mapped table.
    Mapped(Box<dyn TableMemory>),
}

impl FormatTable {
    /// Installs the outcome of mapping an advertised table.
    ///
    /// A mapping failure degrades to [`FormatTable::Unavailable`].
    pub fn install<M>(mapping: Result<M, TableError>) -> Self
    where
        M: TableMemory + 'static,
    {
        match mapping {
            Ok(memory) if memory.bytes().len() >= RECORD_SIZE => Self::Mapped(Box::new(memory)),
            Ok(memory) => {
                log::warn!(
                    "{}",
                    TableError::Truncated {
                        size: memory.bytes().len()
                    }
                );
                Self::Unavailable
            }
            Err(err) => {
                log::warn!("format table unavailable: {err}");
                Self::Unavailable
            }
        }
    }

    /// Builds a mapped table from `(fourcc, modifier)` records.
    #[must_use]
    pub fn from_records(records: &[(u32, Modifier)]) -> Self {
        let mut bytes = Vec::with_capacity(records.len() * RECORD_SIZE);
        for &(format, modifier) in records {
            bytes.extend_from_slice(&format.to_ne_bytes());
            bytes.extend_from_slice(&[0; 4]);
            bytes.extend_from_slice(&modifier.0.to_ne_bytes());
        }
        Self::Mapped(Box::new(bytes))
    }

    /// Returns `true` for [`FormatTable::Absent`].
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns `true` if lookups can succeed.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }

    /// Number of complete records, zero unless mapped.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Mapped(memory) => memory.bytes().len() / RECORD_SIZE,
            Self::Absent | Self::Unavailable => 0,
        }
    }

    /// Returns `true` if the table holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up record `index`.
    ///
    /// Returns `None` when the table is not mapped or `index` lies beyond
    /// the mapped size.
    #[must_use]
    pub fn resolve(&self, index: u16) -> Option<(u32, Modifier)> {
        let Self::Mapped(memory) = self else {
            return None;
        };
        let start = usize::from(index) * RECORD_SIZE;
        let record = memory.bytes().get(start..start + RECORD_SIZE)?;
        let format = u32::from_ne_bytes(record[0..4].try_into().ok()?);
        let modifier = u64::from_ne_bytes(record[8..16].try_into().ok()?);
        Some((format, Modifier(modifier)))
    }

    /// Moves the table out, leaving [`FormatTable::Absent`] behind.
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }
}

impl fmt::Debug for FormatTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("FormatTable::Absent"),
            Self::Unavailable => f.write_str("FormatTable::Unavailable"),
            Self::Mapped(_) => write!(f, "FormatTable::Mapped({} records)", self.len()),
        }
    }
}

/// Decodes a `wl_array` of 16-bit table indices in host byte order.
///
/// A trailing odd byte is ignored.
#[must_use]
pub fn indices_from_ne_bytes(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::format::drm;

    #[test]
    fn resolves_records_in_bounds() {
        let table = FormatTable::from_records(&[
            (drm::XRGB8888, Modifier::LINEAR),
            (drm::ARGB8888, Modifier(0x0100_0000_0000_0001)),
        ]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve(0), Some((drm::XRGB8888, Modifier::LINEAR)));
        assert_eq!(
            table.resolve(1),
            Some((drm::ARGB8888, Modifier(0x0100_0000_0000_0001)))
        );
        assert_eq!(table.resolve(2), None);
        assert_eq!(table.resolve(u16::MAX), None);
    }

    #[test]
    fn partial_trailing_record_is_not_readable() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&drm::XRGB8888.to_ne_bytes());
        bytes.extend_from_slice(&[0; 12]);
        bytes.extend_from_slice(&[0xaa; 7]);
        let table = FormatTable::install(Ok::<_, TableError>(bytes));

        assert_eq!(table.len(), 1);
        assert!(table.resolve(0).is_some());
        assert!(table.resolve(1).is_none());
    }

    #[test]
    fn map_failure_is_unavailable() {
        let table = FormatTable::install::<Vec<u8>>(Err(TableError::Map(io::Error::from(
            io::ErrorKind::PermissionDenied,
        ))));
        assert!(!table.is_absent());
        assert!(!table.is_mapped());
        assert_eq!(table.resolve(0), None);
    }

    #[test]
    fn short_table_is_unavailable() {
        let table = FormatTable::install(Ok::<_, TableError>(vec![0_u8; 8]));
        assert!(matches!(table, FormatTable::Unavailable));
    }

    #[test]
    fn absent_table_resolves_nothing() {
        assert_eq!(FormatTable::Absent.resolve(0), None);
    }

    #[test]
    fn take_leaves_absent() {
        let mut table = FormatTable::from_records(&[(drm::XRGB8888, Modifier::LINEAR)]);
        let stolen = table.take();
        assert!(table.is_absent());
        assert_eq!(stolen.len(), 1);
    }

    #[test]
    fn indices_decode_in_host_order() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&3_u16.to_ne_bytes());
        bytes.extend_from_slice(&258_u16.to_ne_bytes());
        bytes.push(9);
        assert_eq!(indices_from_ne_bytes(&bytes), [3, 258]);
    }
}
