// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend-owned event queue.
//!
//! Every connection opened by [`WaylandPlatform`](crate::WaylandPlatform)
//! gets its own `EventQueue<QueueState>`, so presentation traffic never
//! runs through the application's dispatch loop.
//!
//! ```text
//!   EventQueue<QueueState> + QueueState
//!     -> QueueHandle<QueueState>
//!   registry, wl_shm, zwp_linux_dmabuf_v1, feedback objects,
//!   wl_buffer and wl_callback are all created with that handle
//!   Dispatch impls decode events into QueueState::events
//!   the backend drains QueueState::events after every dispatch
//! ```
//!
//! Objects created with another queue's handle never deliver events here.

use wayland_client::{
    Connection, DispatchError, EventQueue, QueueHandle,
    backend::{ReadEventsGuard, WaylandError},
    protocol::wl_shm::WlShm,
};
use wayland_protocols::wp::linux_dmabuf::zv1::client::zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1;

use vitrail_core::backend::PeerEvent;
use vitrail_core::discovery::Globals;
use vitrail_core::error::TransportError;

/// State the queue's dispatch handlers write into.
#[derive(Debug, Default)]
pub(crate) struct QueueState {
    pub(crate) software: bool,
    pub(crate) globals: Globals,
    pub(crate) shm: Option<WlShm>,
    pub(crate) dmabuf: Option<ZwpLinuxDmabufV1>,
    pub(crate) events: Vec<PeerEvent>,
}

impl QueueState {
    /// Creates state for a connection in the given rendering mode.
    pub(crate) fn new(software: bool) -> Self {
        Self {
            software,
            ..Self::default()
        }
    }

    pub(crate) fn globals(&self) -> Globals {
        self.globals
    }
}

/// An event queue together with the state it dispatches into.
#[derive(Debug)]
pub(crate) struct OwnedQueue {
    event_queue: EventQueue<QueueState>,
    state: QueueState,
}

impl OwnedQueue {
    pub(crate) fn new(connection: &Connection, software: bool) -> Self {
        Self {
            event_queue: connection.new_event_queue(),
            state: QueueState::new(software),
        }
    }

    pub(crate) fn queue_handle(&self) -> QueueHandle<QueueState> {
        self.event_queue.handle()
    }

    /// Dispatches already-queued events, moving decoded ones into `events`.
    ///
    /// Performs no socket I/O.
    pub(crate) fn dispatch_pending(
        &mut self,
        events: &mut Vec<PeerEvent>,
    ) -> Result<usize, TransportError> {
        let count = self
            .event_queue
            .dispatch_pending(&mut self.state)
            .map_err(dispatch_error)?;
        events.append(&mut self.state.events);
        Ok(count)
    }

    /// Flushes, blocks until events arrive, and dispatches them.
    pub(crate) fn blocking_dispatch(
        &mut self,
        events: &mut Vec<PeerEvent>,
    ) -> Result<usize, TransportError> {
        let count = self
            .event_queue
            .blocking_dispatch(&mut self.state)
            .map_err(dispatch_error)?;
        events.append(&mut self.state.events);
        Ok(count)
    }

    pub(crate) fn roundtrip(&mut self, events: &mut Vec<PeerEvent>) -> Result<(), TransportError> {
        self.event_queue
            .roundtrip(&mut self.state)
            .map_err(dispatch_error)?;
        events.append(&mut self.state.events);
        Ok(())
    }

    pub(crate) fn flush(&self) -> Result<(), TransportError> {
        self.event_queue.flush().map_err(wayland_error)
    }

    /// Starts a synchronized socket read.
    ///
    /// Returns [`None`] while events are queued; dispatch them first.
    pub(crate) fn prepare_read(&self) -> Option<ReadEventsGuard> {
        self.event_queue.prepare_read()
    }

    pub(crate) fn state(&self) -> &QueueState {
        &self.state
    }
}

pub(crate) fn wayland_error(err: WaylandError) -> TransportError {
    match err {
        WaylandError::Io(err) => TransportError::Io(err),
        WaylandError::Protocol(err) => TransportError::Protocol {
            interface: err.object_interface,
            code: err.code,
            message: err.message,
        },
    }
}

fn dispatch_error(err: DispatchError) -> TransportError {
    match err {
        DispatchError::BadMessage {
            interface, opcode, ..
        } => TransportError::Protocol {
            interface: interface.to_owned(),
            code: u32::from(opcode),
            message: "malformed event".to_owned(),
        },
        DispatchError::Backend(err) => wayland_error(err),
    }
}
