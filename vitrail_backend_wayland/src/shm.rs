// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared-memory regions and format table mappings.
//!
//! [`ShmRegion`] is an anonymous memfd mapped read-write and shared, used to
//! back `wl_shm` buffers. [`MappedTable`] is a private read-only mapping of
//! the format table descriptor sent with dma-buf feedback.

use core::fmt;
use core::ptr::{self, NonNull};
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use rustix::fs::{MemfdFlags, ftruncate, memfd_create};
use rustix::mm::{MapFlags, ProtFlags, mmap, munmap};
use vitrail_core::backend::HostMemory;
use vitrail_core::error::TableError;
use vitrail_core::table::{RECORD_SIZE, TableMemory};

struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

impl Mapping {
    #[expect(unsafe_code, reason = "creating a memory mapping")]
    fn new(fd: BorrowedFd<'_>, len: usize, writable: bool) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        let (prot, flags) = if writable {
            (ProtFlags::READ | ProtFlags::WRITE, MapFlags::SHARED)
        } else {
            (ProtFlags::READ, MapFlags::PRIVATE)
        };
        // SAFETY: the kernel picks a fresh address, so the mapping aliases
        // no existing Rust memory.
        let addr = unsafe { mmap(ptr::null_mut(), len, prot, flags, fd, 0) }?;
        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable))?;
        Ok(Self { ptr, len })
    }

    #[expect(unsafe_code, reason = "viewing a live mapping as a slice")]
    fn bytes(&self) -> &[u8] {
        // SAFETY: `ptr` maps `len` readable bytes until `self` is dropped.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[expect(unsafe_code, reason = "viewing a live mapping as a slice")]
    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: only called on shared read-write mappings, borrowed
        // exclusively through `self`.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for Mapping {
    #[expect(unsafe_code, reason = "releasing a memory mapping")]
    fn drop(&mut self) {
        // SAFETY: `ptr` and `len` describe a mapping created by `new` that
        // no borrow outlives.
        if let Err(err) = unsafe { munmap(self.ptr.as_ptr().cast(), self.len) } {
            log::warn!("munmap of {} bytes failed: {err}", self.len);
        }
    }
}

/// An anonymous shared-memory region.
pub struct ShmRegion {
    fd: OwnedFd,
    mapping: Mapping,
}

impl ShmRegion {
    /// Creates and maps a region of `size` bytes.
    pub fn new(size: usize) -> io::Result<Self> {
        let fd = memfd_create(
            "vitrail-shm",
            MemfdFlags::CLOEXEC | MemfdFlags::ALLOW_SEALING,
        )?;
        ftruncate(&fd, size as u64)?;
        let mapping = Mapping::new(fd.as_fd(), size, true)?;
        Ok(Self { fd, mapping })
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mapping.len
    }

    /// Returns `true` if the region holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mapping.len == 0
    }

    /// Descriptor to share with the compositor.
    #[must_use]
    pub fn fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl HostMemory for ShmRegion {
    fn as_bytes(&self) -> &[u8] {
        self.mapping.bytes()
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.mapping.bytes_mut()
    }
}

impl fmt::Debug for ShmRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShmRegion")
            .field("fd", &self.fd)
            .field("len", &self.mapping.len)
            .finish()
    }
}

/// A compositor format table, mapped read-only.
pub struct MappedTable {
    mapping: Mapping,
}

impl MappedTable {
    /// Maps the table `fd` of `size` bytes. The descriptor is closed once
    /// mapped.
    pub fn map(fd: OwnedFd, size: u32) -> Result<Self, TableError> {
        let size = size as usize;
        if size < RECORD_SIZE {
            return Err(TableError::Truncated { size });
        }
        let mapping = Mapping::new(fd.as_fd(), size, false)?;
        Ok(Self { mapping })
    }
}

impl TableMemory for MappedTable {
    fn bytes(&self) -> &[u8] {
        self.mapping.bytes()
    }
}

impl fmt::Debug for MappedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedTable")
            .field("len", &self.mapping.len)
            .finish()
    }
}
