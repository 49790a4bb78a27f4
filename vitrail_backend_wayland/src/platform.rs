// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! [`Platform`] and [`Backend`] over `wayland-client`.

use core::fmt;
use std::io;

use rustix::event::{PollFd, PollFlags, poll};
use rustix::io::Errno;
use wayland_client::{
    Connection, Proxy,
    backend::{ReadEventsGuard, WaylandError},
    protocol::{
        wl_buffer::WlBuffer, wl_callback::WlCallback, wl_registry::WlRegistry, wl_shm,
        wl_surface::WlSurface,
    },
};
use wayland_protocols::wp::linux_dmabuf::zv1::client::{
    zwp_linux_buffer_params_v1, zwp_linux_dmabuf_feedback_v1::ZwpLinuxDmabufFeedbackV1,
};

use vitrail_core::backend::{
    Backend, BufferKey, DmabufBufferDesc, PeerEvent, Platform, PollOutcome, ShmBufferDesc,
    SwapchainId,
};
use vitrail_core::discovery::{Globals, WL_SHM, ZWP_LINUX_DMABUF_V1};
use vitrail_core::error::{TransportError, WsiError};
use vitrail_core::time::{Duration, HostTime};

use crate::dispatch::FeedbackTarget;
use crate::event_loop::{OwnedQueue, wayland_error};
use crate::shm::ShmRegion;
use crate::time::{now, poll_timeout};

/// A Wayland connection plus the surface to present to.
///
/// The application creates the `wl_surface`; every connection opened from
/// here sends its surface requests on it but reads events on a private
/// queue.
#[derive(Clone, Debug)]
pub struct WaylandPlatform {
    connection: Connection,
    surface: WlSurface,
}

impl WaylandPlatform {
    /// Wraps an application connection and surface.
    #[must_use]
    pub fn new(connection: Connection, surface: WlSurface) -> Self {
        Self {
            connection,
            surface,
        }
    }

    /// The surface presented to.
    #[must_use]
    pub fn surface(&self) -> &WlSurface {
        &self.surface
    }
}

impl Platform for WaylandPlatform {
    type Backend = WaylandBackend;

    fn connect(&self, software: bool) -> Result<WaylandBackend, WsiError> {
        let queue = OwnedQueue::new(&self.connection, software);
        let registry = self
            .connection
            .display()
            .get_registry(&queue.queue_handle(), ());
        Ok(WaylandBackend {
            queue,
            registry: Some(registry),
            default_feedback: None,
            surface_feedback: None,
            surface: self.surface.clone(),
        })
    }
}

/// One connection with its own event queue.
pub struct WaylandBackend {
    queue: OwnedQueue,
    registry: Option<WlRegistry>,
    default_feedback: Option<ZwpLinuxDmabufFeedbackV1>,
    surface_feedback: Option<ZwpLinuxDmabufFeedbackV1>,
    surface: WlSurface,
}

impl WaylandBackend {
    fn missing(interface: &'static str) -> TransportError {
        TransportError::MissingGlobal(interface)
    }

    fn protocol_size(value: u32, what: &str) -> Result<i32, TransportError> {
        i32::try_from(value).map_err(|_| {
            TransportError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{what} {value} exceeds the protocol range"),
            ))
        })
    }
}

impl Backend for WaylandBackend {
    type Buffer = WlBuffer;
    type FrameCallback = WlCallback;
    type HostRegion = ShmRegion;
    type ReadGuard = ReadEventsGuard;

    fn now(&self) -> HostTime {
        now()
    }

    fn globals(&self) -> Globals {
        self.queue.state().globals()
    }

    fn roundtrip(&mut self, events: &mut Vec<PeerEvent>) -> Result<(), TransportError> {
        self.queue.roundtrip(events)
    }

    fn subscribe_default_feedback(&mut self) -> Result<(), TransportError> {
        let dmabuf = self
            .queue
            .state()
            .dmabuf
            .as_ref()
            .ok_or(Self::missing(ZWP_LINUX_DMABUF_V1))?;
        let feedback =
            dmabuf.get_default_feedback(&self.queue.queue_handle(), FeedbackTarget::Default);
        self.default_feedback = Some(feedback);
        Ok(())
    }

    fn finish_discovery(&mut self) {
        if let Some(feedback) = self.default_feedback.take() {
            feedback.destroy();
        }
        // wl_registry has no destructor request.
        self.registry = None;
    }

    fn subscribe_surface_feedback(&mut self) -> Result<bool, TransportError> {
        if !self.globals().supports_feedback() {
            return Ok(false);
        }
        let dmabuf = self
            .queue
            .state()
            .dmabuf
            .as_ref()
            .ok_or(Self::missing(ZWP_LINUX_DMABUF_V1))?;
        let feedback = dmabuf.get_surface_feedback(
            &self.surface,
            &self.queue.queue_handle(),
            FeedbackTarget::Surface,
        );
        self.surface_feedback = Some(feedback);
        Ok(true)
    }

    fn dispatch_pending(&mut self, events: &mut Vec<PeerEvent>) -> Result<usize, TransportError> {
        self.queue.dispatch_pending(events)
    }

    fn blocking_dispatch(&mut self, events: &mut Vec<PeerEvent>) -> Result<usize, TransportError> {
        self.queue.blocking_dispatch(events)
    }

    fn prepare_read(&mut self) -> Result<Option<ReadEventsGuard>, TransportError> {
        Ok(self.queue.prepare_read())
    }

    fn poll_readable(
        &mut self,
        guard: &ReadEventsGuard,
        timeout: Duration,
    ) -> Result<PollOutcome, TransportError> {
        let fd = guard.connection_fd();
        let mut fds = [PollFd::new(&fd, PollFlags::IN)];
        let timeout = poll_timeout(timeout);
        match poll(&mut fds, timeout.as_ref()) {
            Ok(0) => Ok(PollOutcome::TimedOut),
            // Errors and hangups surface when reading.
            Ok(_) => Ok(PollOutcome::Ready),
            Err(Errno::INTR | Errno::AGAIN) => Ok(PollOutcome::Interrupted),
            Err(errno) => Err(TransportError::Io(errno.into())),
        }
    }

    fn read_events(&mut self, guard: ReadEventsGuard) -> Result<(), TransportError> {
        match guard.read() {
            Ok(_) => Ok(()),
            Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(err) => Err(wayland_error(err)),
        }
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.queue.flush()
    }

    fn surface_version(&self) -> u32 {
        self.surface.version()
    }

    fn attach(&mut self, buffer: &WlBuffer) {
        self.surface.attach(Some(buffer), 0, 0);
    }

    fn damage_buffer(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.surface.damage_buffer(x, y, width, height);
    }

    fn damage(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.surface.damage(x, y, width, height);
    }

    fn request_frame(&mut self, chain: SwapchainId) -> WlCallback {
        self.surface.frame(&self.queue.queue_handle(), chain)
    }

    fn commit(&mut self) {
        self.surface.commit();
    }

    fn create_host_region(&mut self, size: usize) -> Result<ShmRegion, WsiError> {
        ShmRegion::new(size).map_err(|err| {
            log::warn!("shared memory region of {size} bytes failed: {err}");
            WsiError::OutOfHostMemory
        })
    }

    fn create_shm_buffer(
        &mut self,
        region: &ShmRegion,
        desc: &ShmBufferDesc,
        key: BufferKey,
    ) -> Result<WlBuffer, TransportError> {
        let shm = self
            .queue
            .state()
            .shm
            .as_ref()
            .ok_or(Self::missing(WL_SHM))?;
        let format = wl_shm::Format::try_from(desc.format).map_err(|()| {
            TransportError::Protocol {
                interface: WL_SHM.to_owned(),
                code: wl_shm::Error::InvalidFormat as u32,
                message: format!("unknown wl_shm format {:#x}", desc.format),
            }
        })?;
        let size = i32::try_from(region.len()).map_err(|_| {
            TransportError::Io(io::Error::from(io::ErrorKind::InvalidInput))
        })?;
        let width = Self::protocol_size(desc.extent.width, "width")?;
        let height = Self::protocol_size(desc.extent.height, "height")?;
        let stride = Self::protocol_size(desc.stride, "stride")?;

        let qh = self.queue.queue_handle();
        let pool = shm.create_pool(region.fd(), size, &qh, ());
        let buffer = pool.create_buffer(0, width, height, stride, format, &qh, key);
        pool.destroy();
        Ok(buffer)
    }

    fn create_dmabuf_buffer(
        &mut self,
        desc: &DmabufBufferDesc<'_>,
        key: BufferKey,
    ) -> Result<WlBuffer, TransportError> {
        let dmabuf = self
            .queue
            .state()
            .dmabuf
            .as_ref()
            .ok_or(Self::missing(ZWP_LINUX_DMABUF_V1))?;
        let width = Self::protocol_size(desc.extent.width, "width")?;
        let height = Self::protocol_size(desc.extent.height, "height")?;

        let qh = self.queue.queue_handle();
        let params = dmabuf.create_params(&qh, ());
        for (plane, layout) in (0_u32..).zip(desc.planes) {
            params.add(
                desc.fd,
                plane,
                layout.offset,
                layout.stride,
                desc.modifier.hi(),
                desc.modifier.lo(),
            );
        }
        let buffer = params.create_immed(
            width,
            height,
            desc.format,
            zwp_linux_buffer_params_v1::Flags::empty(),
            &qh,
            key,
        );
        params.destroy();
        Ok(buffer)
    }

    fn destroy_buffer(&mut self, buffer: WlBuffer) {
        buffer.destroy();
    }
}

impl Drop for WaylandBackend {
    fn drop(&mut self) {
        self.finish_discovery();
        if let Some(feedback) = self.surface_feedback.take() {
            feedback.destroy();
        }
    }
}

impl fmt::Debug for WaylandBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaylandBackend")
            .field("globals", &self.globals())
            .field("surface", &self.surface.id())
            .field("surface_feedback", &self.surface_feedback.is_some())
            .finish_non_exhaustive()
    }
}
