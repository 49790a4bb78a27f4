// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contracts for the transport and image-allocation collaborators.
//!
//! The presentation engine never touches a socket or a GPU allocator
//! directly. It drives three traits:
//!
//! - **[`Platform`]**: opens a display connection with its own event queue.
//!   Called lazily by a [`Surface`](crate::surface::Surface) and once per
//!   capability query.
//!
//! - **[`Backend`]**: one open connection. Issues surface and buffer
//!   requests, and delivers compositor events as decoded [`PeerEvent`]
//!   values instead of callbacks. The blocking read discipline is exposed as
//!   the `prepare_read` / `poll_readable` / `read_events` triad so the
//!   acquire loop can share the connection with other readers.
//!
//! - **[`ImageAllocator`]**: creates and destroys the renderer-side images
//!   behind each swapchain slot.
//!
//! `vitrail_backend_wayland` implements [`Platform`] and [`Backend`] on
//! `wayland-client`. Tests implement them with a scripted in-memory peer.

use std::os::fd::{BorrowedFd, OwnedFd};

use crate::discovery::{DiscoveryEvent, Globals};
use crate::error::{AllocError, TransportError, WsiError};
use crate::feedback::FeedbackEvent;
use crate::format::{Modifier, PixelFormat};
use crate::geometry::Extent;
use crate::time::{Duration, HostTime};

/// Identifies one swapchain among those created on a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapchainId(pub u64);

/// User data attached to each compositor buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferKey {
    /// Swapchain the buffer belongs to.
    pub chain: SwapchainId,
    /// Image index within that swapchain.
    pub image: u32,
}

/// A compositor event, decoded by the transport.
#[derive(Debug)]
pub enum PeerEvent {
    /// Display-wide discovery during connection setup.
    Discovery(DiscoveryEvent),
    /// Per-surface dma-buf feedback.
    Feedback(FeedbackEvent),
    /// `wl_buffer.release`.
    BufferRelease(BufferKey),
    /// `wl_callback.done` of a frame callback.
    FrameDone(SwapchainId),
}

/// Result of waiting for the connection to become readable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Data is available.
    Ready,
    /// The timeout elapsed first.
    TimedOut,
    /// The wait was interrupted by a signal or spuriously woken.
    Interrupted,
}

/// Layout of one plane of a dma-buf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DmabufPlane {
    /// Byte offset of the plane in the buffer.
    pub offset: u32,
    /// Row pitch in bytes.
    pub stride: u32,
}

/// Parameters of a `wl_shm` buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShmBufferDesc {
    /// Buffer size.
    pub extent: Extent,
    /// Row pitch in bytes.
    pub stride: u32,
    /// `wl_shm` format code.
    pub format: u32,
}

/// Parameters of a dma-buf buffer.
#[derive(Clone, Copy, Debug)]
pub struct DmabufBufferDesc<'a> {
    /// Descriptor shared by all planes.
    pub fd: BorrowedFd<'a>,
    /// Plane layouts, in plane order.
    pub planes: &'a [DmabufPlane],
    /// Layout modifier of every plane.
    pub modifier: Modifier,
    /// Buffer size.
    pub extent: Extent,
    /// DRM fourcc.
    pub format: u32,
}

/// Host memory shared with the compositor.
pub trait HostMemory {
    /// The mapped bytes.
    fn as_bytes(&self) -> &[u8];

    /// The mapped bytes, writable.
    fn as_bytes_mut(&mut self) -> &mut [u8];
}

/// One open display connection with a private event queue.
///
/// All requests go out on that queue, and every event for objects created
/// through it is returned from the dispatch methods.
pub trait Backend {
    /// Compositor-side buffer object.
    type Buffer;
    /// Pending frame callback. Dropping it abandons the callback.
    type FrameCallback;
    /// Shared-memory region backing `wl_shm` buffers.
    type HostRegion: HostMemory;
    /// Intent to read from the connection. Dropping it cancels the read.
    type ReadGuard;

    /// Current time on the clock deadlines are measured against.
    fn now(&self) -> HostTime;

    /// Globals bound so far.
    fn globals(&self) -> Globals;

    /// Flushes, then dispatches until the compositor has processed every
    /// request sent so far.
    fn roundtrip(&mut self, events: &mut Vec<PeerEvent>) -> Result<(), TransportError>;

    /// Requests the connection-wide default dma-buf feedback.
    fn subscribe_default_feedback(&mut self) -> Result<(), TransportError>;

    /// Destroys the registry and the default feedback object.
    fn finish_discovery(&mut self);

    /// Requests dma-buf feedback for the surface.
    ///
    /// Returns `false` if the bound dma-buf version has no feedback.
    fn subscribe_surface_feedback(&mut self) -> Result<bool, TransportError>;

    /// Dispatches already-queued events without blocking.
    fn dispatch_pending(&mut self, events: &mut Vec<PeerEvent>) -> Result<usize, TransportError>;

    /// Blocks until at least one event was dispatched.
    fn blocking_dispatch(&mut self, events: &mut Vec<PeerEvent>) -> Result<usize, TransportError>;

    /// Announces the intent to read.
    ///
    /// Returns `Ok(None)` if events are already queued and must be
    /// dispatched first, which is also what happens when another reader
    /// got there first.
    fn prepare_read(&mut self) -> Result<Option<Self::ReadGuard>, TransportError>;

    /// Waits until the connection is readable or `timeout` elapses.
    /// [`Duration::INFINITE`] waits forever.
    fn poll_readable(
        &mut self,
        guard: &Self::ReadGuard,
        timeout: Duration,
    ) -> Result<PollOutcome, TransportError>;

    /// Reads events from the socket into the queue.
    fn read_events(&mut self, guard: Self::ReadGuard) -> Result<(), TransportError>;

    /// Sends buffered requests.
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Version of the `wl_surface` object.
    fn surface_version(&self) -> u32;

    /// `wl_surface.attach` at offset (0, 0).
    fn attach(&mut self, buffer: &Self::Buffer);

    /// `wl_surface.damage_buffer`.
    fn damage_buffer(&mut self, x: i32, y: i32, width: i32, height: i32);

    /// `wl_surface.damage`, in surface coordinates.
    fn damage(&mut self, x: i32, y: i32, width: i32, height: i32);

    /// `wl_surface.frame`, routed back as [`PeerEvent::FrameDone`].
    fn request_frame(&mut self, chain: SwapchainId) -> Self::FrameCallback;

    /// `wl_surface.commit`.
    fn commit(&mut self);

    /// Creates a shared-memory region of `size` bytes.
    fn create_host_region(&mut self, size: usize) -> Result<Self::HostRegion, WsiError>;

    /// Wraps a whole host region in a `wl_shm` buffer.
    fn create_shm_buffer(
        &mut self,
        region: &Self::HostRegion,
        desc: &ShmBufferDesc,
        key: BufferKey,
    ) -> Result<Self::Buffer, TransportError>;

    /// Imports a dma-buf as a buffer.
    fn create_dmabuf_buffer(
        &mut self,
        desc: &DmabufBufferDesc<'_>,
        key: BufferKey,
    ) -> Result<Self::Buffer, TransportError>;

    /// `wl_buffer.destroy`.
    fn destroy_buffer(&mut self, buffer: Self::Buffer);
}

/// Opens display connections.
pub trait Platform {
    /// Connection type.
    type Backend: Backend;

    /// Creates a private event queue and requests the global registry.
    ///
    /// Globals are bound by the first [`Backend::roundtrip`], following
    /// [`Global::bind_version`](crate::discovery::Global::bind_version)
    /// for `software`.
    fn connect(&self, software: bool) -> Result<Self::Backend, WsiError>;
}

/// Which image the allocator should produce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageKind {
    /// Device-local image exported as a dma-buf. An empty list lets the
    /// allocator choose an implicit layout.
    Native {
        /// Acceptable modifiers, in preference order.
        modifiers: Vec<Modifier>,
    },
    /// Image with a linear CPU-visible layout.
    Cpu,
}

/// Request for one swapchain image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageParams {
    /// Image size.
    pub extent: Extent,
    /// Pixel format.
    pub format: PixelFormat,
    /// Memory kind.
    pub kind: ImageKind,
}

/// How an allocated image can be shared with the compositor.
#[derive(Debug)]
pub enum ImageMemory {
    /// An exported dma-buf. The descriptor is closed with the image.
    DmaBuf {
        /// Descriptor shared by all planes.
        fd: OwnedFd,
        /// Plane layouts.
        planes: Vec<DmabufPlane>,
        /// Modifier the allocator chose.
        modifier: Modifier,
    },
    /// A linear image, shared through host memory.
    Cpu {
        /// Row pitch in bytes.
        row_pitch: u32,
    },
}

/// An image plus its sharing information.
#[derive(Debug)]
pub struct AllocatedImage<I> {
    /// Allocator-owned handle.
    pub image: I,
    /// How to share it.
    pub memory: ImageMemory,
}

/// Creates and destroys renderer-side images.
pub trait ImageAllocator {
    /// Allocator-owned image handle.
    type Image;

    /// Creates one image.
    fn create_image(
        &mut self,
        params: &ImageParams,
    ) -> Result<AllocatedImage<Self::Image>, AllocError>;

    /// Makes `image` render into `memory` directly.
    ///
    /// Only called for CPU images when host import is available.
    fn import_host_memory(
        &mut self,
        image: &mut Self::Image,
        memory: &mut [u8],
    ) -> Result<(), AllocError>;

    /// CPU view of a rendered CPU image, if it has one.
    fn cpu_map<'a>(&'a self, image: &'a Self::Image) -> Option<&'a [u8]>;

    /// Destroys an image.
    fn destroy_image(&mut self, image: Self::Image);
}
