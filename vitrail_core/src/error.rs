// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy for presentation operations.
//!
//! [`WsiError`] is what the produced capability surface returns. Transport
//! failures inside acquire and present are folded into
//! [`WsiError::OutOfDate`] at the boundary: once the connection misbehaves
//! the caller can only recreate the swapchain. During setup they are kept
//! as [`WsiError::Transport`] so the cause stays visible.

use std::io;

/// Errors reported to the application.
#[derive(Debug, thiserror::Error)]
pub enum WsiError {
    /// A host allocation failed during setup.
    #[error("out of host memory")]
    OutOfHostMemory,
    /// The compositor exposes neither shared-memory nor dma-buf buffers.
    #[error("surface lost: compositor offers no usable buffer path")]
    SurfaceLost,
    /// The connection failed while acquiring or presenting, or the
    /// swapchain no longer owns its surface.
    #[error("swapchain is out of date")]
    OutOfDate,
    /// No image became free before the acquire deadline.
    #[error("no image available before the timeout")]
    NotReady,
    /// The surface is owned by a swapchain other than the one being
    /// replaced.
    #[error("surface is already owned by another swapchain")]
    NativeWindowInUse,
    /// The image index does not name an image of this swapchain.
    #[error("image index {0} is out of range")]
    InvalidImageIndex(u32),
    /// The image allocation backend failed.
    #[error("image allocation failed")]
    ImageAllocation(#[from] AllocError),
    /// The transport failed outside of the acquire/present loop.
    #[error("transport failure")]
    Transport(#[from] TransportError),
}

/// Failures of the object-protocol transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Socket or polling failure.
    #[error("connection I/O failed")]
    Io(#[from] io::Error),
    /// The compositor raised a protocol error.
    #[error("protocol error {code} on {interface}: {message}")]
    Protocol {
        /// Interface of the object the error was raised on.
        interface: String,
        /// Interface-specific error code.
        code: u32,
        /// Human readable message sent by the compositor.
        message: String,
    },
    /// The compositor closed the connection.
    #[error("connection closed by the compositor")]
    Disconnected,
    /// A required global was not advertised.
    #[error("compositor does not advertise {0}")]
    MissingGlobal(&'static str),
}

/// Failures to map a compositor-provided format table.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// `mmap` of the table descriptor failed.
    #[error("failed to map format table")]
    Map(#[from] io::Error),
    /// The advertised size holds no complete record.
    #[error("format table of {size} bytes holds no complete record")]
    Truncated {
        /// Size announced by the compositor, in bytes.
        size: usize,
    },
}

/// Failures of the image allocation backend.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    /// Device or host memory was exhausted.
    #[error("out of memory")]
    OutOfMemory,
    /// The allocator cannot produce the requested kind of image.
    #[error("unsupported image request: {0}")]
    Unsupported(&'static str),
    /// The image has no CPU mapping to copy from.
    #[error("image is not host visible")]
    NotHostVisible,
    /// Descriptor or mapping failure.
    #[error("allocator I/O failed")]
    Io(#[from] io::Error),
}

impl WsiError {
    /// Folds a transport failure into [`WsiError::OutOfDate`], logging the
    /// cause.
    pub(crate) fn out_of_date(err: TransportError) -> Self {
        log::debug!("connection failed, swapchain is out of date: {err}");
        Self::OutOfDate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_convert() {
        let err: WsiError = TransportError::Disconnected.into();
        assert!(matches!(err, WsiError::Transport(TransportError::Disconnected)));

        let io_err = io::Error::from(io::ErrorKind::BrokenPipe);
        let err: TransportError = io_err.into();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[test]
    fn acquire_path_folds_to_out_of_date() {
        let err = WsiError::out_of_date(TransportError::Disconnected);
        assert!(matches!(err, WsiError::OutOfDate));
    }

    #[test]
    fn messages_name_the_cause() {
        let err = TransportError::MissingGlobal("wl_shm");
        assert_eq!(err.to_string(), "compositor does not advertise wl_shm");
        assert_eq!(
            TableError::Truncated { size: 8 }.to_string(),
            "format table of 8 bytes holds no complete record"
        );
    }
}
