// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Presentable surfaces.
//!
//! A [`Surface`] pairs an application window (reached through its
//! [`Platform`]) with a lazily opened [`Display`] connection and, when the
//! compositor supports it, live per-surface dma-buf feedback.
//!
//! At most one swapchain owns a surface at a time. Ownership is tracked by
//! [`SwapchainId`] instead of a pointer: a swapchain checks
//! [`Surface::owner`] before every operation, and whichever side tears
//! down first clears the link.
//!
//! Events read from the connection are routed here. Feedback events update
//! the surface's [`SurfaceFeedback`]; buffer releases and frame callbacks
//! are queued as [`SurfaceEvent`]s for the owning swapchain to apply.
//!
//! Each feedback commit is compared with the owner's allocation as it
//! lands, so a commit that disagrees is reported even if a later one in the
//! same dispatch agrees again.

use core::fmt;

use crate::backend::{Backend, BufferKey, PeerEvent, Platform, SwapchainId};
use crate::catalog::{RenderSupport, same_modifier_set};
use crate::config::WsiConfig;
use crate::display::{Display, DisplayRequest};
use crate::error::{TransportError, WsiError};
use crate::feedback::{FeedbackDelta, SurfaceFeedback};
use crate::format::{Modifier, PixelFormat};

/// An event for the swapchain that owns a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The compositor released a buffer.
    BufferRelease(BufferKey),
    /// A frame callback fired.
    FrameDone(SwapchainId),
    /// A committed feedback burst prefers other modifiers than the
    /// swapchain allocated with.
    FeedbackChanged(SwapchainId),
}

/// What the owning swapchain allocated with.
#[derive(Debug)]
struct Allocation {
    chain: SwapchainId,
    format: PixelFormat,
    modifiers: Vec<Modifier>,
}

impl Allocation {
    fn disagrees_with(&self, feedback: &SurfaceFeedback) -> bool {
        feedback
            .current()
            .pick_format(self.format)
            .is_some_and(|entry| !same_modifier_set(entry.modifiers(), &self.modifiers))
    }
}

/// A window plus its connection state.
pub struct Surface<P: Platform> {
    platform: P,
    config: WsiConfig,
    support: Box<dyn RenderSupport>,
    display: Option<Display<P::Backend>>,
    feedback: Option<SurfaceFeedback>,
    owner: Option<SwapchainId>,
    allocation: Option<Allocation>,
    next_chain: u64,
    inbox: Vec<PeerEvent>,
    outbox: Vec<SurfaceEvent>,
}

impl<P: Platform> Surface<P> {
    /// Creates a surface. No connection is opened until the first
    /// swapchain is created.
    pub fn new(platform: P, config: WsiConfig, support: Box<dyn RenderSupport>) -> Self {
        Self {
            platform,
            config,
            support,
            display: None,
            feedback: None,
            owner: None,
            allocation: None,
            next_chain: 1,
            inbox: Vec::new(),
            outbox: Vec::new(),
        }
    }

    /// Presentation configuration.
    #[must_use]
    pub fn config(&self) -> &WsiConfig {
        &self.config
    }

    /// Platform the surface connects through.
    #[must_use]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Device render support used to filter formats.
    #[must_use]
    pub fn render_support(&self) -> &dyn RenderSupport {
        &*self.support
    }

    /// The connection, once initialized.
    #[must_use]
    pub fn display(&self) -> Option<&Display<P::Backend>> {
        self.display.as_ref()
    }

    /// Live dma-buf feedback, if the compositor provides it.
    #[must_use]
    pub fn feedback(&self) -> Option<&SurfaceFeedback> {
        self.feedback.as_ref()
    }

    /// The swapchain that currently owns the surface.
    #[must_use]
    pub fn owner(&self) -> Option<SwapchainId> {
        self.owner
    }

    /// Opens the connection and subscribes to surface feedback.
    ///
    /// Does nothing if already initialized. On failure the surface stays
    /// uninitialized and a later call retries.
    pub fn init(&mut self) -> Result<(), WsiError> {
        if self.display.is_some() {
            return Ok(());
        }

        let request = DisplayRequest {
            get_format_list: true,
            software: self.config.software,
            bgra8_unorm_first: self.config.force_bgra8_unorm_first,
        };
        let mut display = Display::open(&self.platform, request, &*self.support)?;

        let mut feedback = None;
        if display.globals().supports_feedback() {
            let backend = display.backend_mut();
            if backend.subscribe_surface_feedback()? {
                if let Err(err) = backend.roundtrip(&mut self.inbox) {
                    self.inbox.clear();
                    return Err(err.into());
                }
                feedback = Some(SurfaceFeedback::new());
            }
        }

        self.feedback = feedback;
        self.display = Some(display);
        self.route();
        log::debug!(
            "surface initialized, feedback {}",
            if self.feedback.is_some() { "live" } else { "unavailable" }
        );
        Ok(())
    }

    /// Takes ownership for a new swapchain.
    ///
    /// `replacing` is the swapchain being retired, which loses the surface
    /// here. Fails with [`WsiError::NativeWindowInUse`] if some other
    /// swapchain still owns it.
    pub(crate) fn claim(&mut self, replacing: Option<SwapchainId>) -> Result<SwapchainId, WsiError> {
        if let Some(owner) = self.owner
            && Some(owner) != replacing
        {
            return Err(WsiError::NativeWindowInUse);
        }

        let id = SwapchainId(self.next_chain);
        self.next_chain += 1;
        self.allocation = None;
        if let Some(old) = self.owner.replace(id) {
            log::debug!("{old:?} retired, {id:?} owns the surface");
        }
        Ok(id)
    }

    /// Records what the owner allocated with; later feedback commits are
    /// checked against it.
    pub(crate) fn set_allocation(
        &mut self,
        chain: SwapchainId,
        format: PixelFormat,
        modifiers: &[Modifier],
    ) {
        if self.owner == Some(chain) {
            self.allocation = Some(Allocation {
                chain,
                format,
                modifiers: modifiers.to_vec(),
            });
        }
    }

    /// Clears ownership if `chain` holds it.
    pub(crate) fn disown(&mut self, chain: SwapchainId) {
        if self.owner == Some(chain) {
            self.owner = None;
            self.allocation = None;
            // Nobody is left to consume these.
            self.outbox.clear();
        }
    }

    pub(crate) fn backend_mut(&mut self) -> Result<&mut P::Backend, WsiError> {
        self.display
            .as_mut()
            .map(Display::backend_mut)
            .ok_or(WsiError::OutOfDate)
    }

    /// Dispatches queued events without blocking.
    pub(crate) fn dispatch_pending(&mut self) -> Result<usize, TransportError> {
        let Some(display) = self.display.as_mut() else {
            return Ok(0);
        };
        let count = display.backend_mut().dispatch_pending(&mut self.inbox)?;
        self.route();
        Ok(count)
    }

    /// Blocks until at least one event was dispatched.
    pub(crate) fn blocking_dispatch(&mut self) -> Result<usize, TransportError> {
        let Some(display) = self.display.as_mut() else {
            return Err(TransportError::Disconnected);
        };
        let count = display.backend_mut().blocking_dispatch(&mut self.inbox)?;
        self.route();
        Ok(count)
    }

    /// Hands queued swapchain events to the caller.
    pub(crate) fn take_events(&mut self) -> Vec<SurfaceEvent> {
        core::mem::take(&mut self.outbox)
    }

    fn route(&mut self) {
        for event in self.inbox.drain(..) {
            match event {
                PeerEvent::Feedback(event) => {
                    let Some(feedback) = self.feedback.as_mut() else {
                        log::trace!("dropping {event:?}: not subscribed");
                        continue;
                    };
                    if feedback.dispatch_event(event, &*self.support) != FeedbackDelta::Committed {
                        continue;
                    }
                    if let Some(allocation) = &self.allocation
                        && allocation.disagrees_with(feedback)
                    {
                        self.outbox.push(SurfaceEvent::FeedbackChanged(allocation.chain));
                    }
                }
                PeerEvent::BufferRelease(key) => self.outbox.push(SurfaceEvent::BufferRelease(key)),
                PeerEvent::FrameDone(chain) => self.outbox.push(SurfaceEvent::FrameDone(chain)),
                PeerEvent::Discovery(event) => {
                    log::trace!("dropping late discovery event {event:?}");
                }
            }
        }
    }
}

impl<P: Platform> fmt::Debug for Surface<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("config", &self.config)
            .field("display", &self.display)
            .field("feedback", &self.feedback.is_some())
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}
