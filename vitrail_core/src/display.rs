// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display connection setup.

use core::fmt;

use crate::backend::{Backend, PeerEvent, Platform};
use crate::catalog::{FormatCatalog, RenderSupport};
use crate::discovery::{FormatDiscovery, Globals};
use crate::error::WsiError;

/// What to learn while opening a display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisplayRequest {
    /// Collect the compositor's formats and modifiers.
    pub get_format_list: bool,
    /// Bind the software (`wl_shm`) path instead of dma-buf.
    pub software: bool,
    /// Move `B8G8R8A8Unorm` to the front of the format list.
    pub bgra8_unorm_first: bool,
}

/// An open connection plus what was discovered on it.
pub struct Display<B> {
    backend: B,
    globals: Globals,
    formats: FormatCatalog,
}

impl<B: Backend> Display<B> {
    /// Opens a connection and discovers globals and, optionally, formats.
    ///
    /// Fails with [`WsiError::SurfaceLost`] if the compositor offers no
    /// buffer path for the requested rendering mode. The connection-wide
    /// feedback is only sampled here; it is destroyed before returning.
    pub fn open<P>(
        platform: &P,
        request: DisplayRequest,
        support: &dyn RenderSupport,
    ) -> Result<Self, WsiError>
    where
        P: Platform<Backend = B>,
    {
        let mut backend = platform.connect(request.software)?;
        let mut discovery = FormatDiscovery::new();
        let mut events = Vec::new();

        backend.roundtrip(&mut events)?;
        absorb(&mut discovery, &mut events, support);

        let globals = backend.globals();
        if !globals.has_buffer_path() {
            log::warn!(
                "compositor offers no {} buffers",
                if request.software { "wl_shm" } else { "dma-buf" }
            );
            backend.finish_discovery();
            return Err(WsiError::SurfaceLost);
        }
        log::debug!("bound globals {globals:?}");

        if request.get_format_list {
            if globals.supports_feedback() {
                backend.subscribe_default_feedback()?;
                discovery.default_feedback_bound();
            }
            backend.roundtrip(&mut events)?;
            absorb(&mut discovery, &mut events, support);
        }
        backend.finish_discovery();

        let formats = discovery.finish(request.bgra8_unorm_first);
        log::debug!("display offers {} formats", formats.len());
        Ok(Self {
            backend,
            globals,
            formats,
        })
    }

    /// The connection.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The connection, mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Globals bound on the connection.
    #[must_use]
    pub fn globals(&self) -> Globals {
        self.globals
    }

    /// Formats the compositor accepts on this connection.
    #[must_use]
    pub fn formats(&self) -> &FormatCatalog {
        &self.formats
    }
}

impl<B> fmt::Debug for Display<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Display")
            .field("globals", &self.globals)
            .field("formats", &self.formats.len())
            .finish_non_exhaustive()
    }
}

fn absorb(
    discovery: &mut FormatDiscovery,
    events: &mut Vec<PeerEvent>,
    support: &dyn RenderSupport,
) {
    for event in events.drain(..) {
        match event {
            PeerEvent::Discovery(event) => discovery.dispatch_event(event, support),
            other => log::trace!("ignoring {other:?} during display setup"),
        }
    }
}
