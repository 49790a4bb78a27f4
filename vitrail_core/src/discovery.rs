// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Global binding policy and display-wide format discovery.
//!
//! A display connection learns the compositor's formats from three
//! sources, depending on what it bound:
//!
//! - `wl_shm.format` events (software rendering only),
//! - legacy `zwp_linux_dmabuf_v1.modifier` events,
//! - the connection-wide default dma-buf feedback, sampled once.
//!
//! [`FormatDiscovery`] folds all three into one [`FormatCatalog`].

use crate::catalog::{FormatCatalog, RenderSupport};
use crate::feedback::FeedbackEvent;
use crate::format::{Modifier, PixelFormat};
use crate::table::FormatTable;

/// `wl_shm` interface name.
pub const WL_SHM: &str = "wl_shm";
/// `zwp_linux_dmabuf_v1` interface name.
pub const ZWP_LINUX_DMABUF_V1: &str = "zwp_linux_dmabuf_v1";

/// Oldest `zwp_linux_dmabuf_v1` version with modifier events.
pub const DMABUF_MIN_VERSION: u32 = 3;
/// First `zwp_linux_dmabuf_v1` version with feedback objects.
pub const DMABUF_FEEDBACK_VERSION: u32 = 4;

/// A global this crate binds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Global {
    /// `wl_shm`.
    Shm,
    /// `zwp_linux_dmabuf_v1`.
    LinuxDmabuf,
}

impl Global {
    /// Decides whether to bind an advertised global, and at which version.
    ///
    /// Software rendering binds only `wl_shm` (version 1). Hardware
    /// rendering binds only `zwp_linux_dmabuf_v1`, from version 3, capped at
    /// the feedback version.
    #[must_use]
    pub fn bind_version(interface: &str, advertised: u32, software: bool) -> Option<(Self, u32)> {
        if software {
            return (interface == WL_SHM).then_some((Self::Shm, 1));
        }
        (interface == ZWP_LINUX_DMABUF_V1 && advertised >= DMABUF_MIN_VERSION)
            .then(|| (Self::LinuxDmabuf, advertised.min(DMABUF_FEEDBACK_VERSION)))
    }
}

/// Versions of the globals a connection bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Globals {
    /// Bound `wl_shm` version.
    pub shm: Option<u32>,
    /// Bound `zwp_linux_dmabuf_v1` version.
    pub dmabuf: Option<u32>,
}

impl Globals {
    /// Records a bound global.
    pub fn record(&mut self, global: Global, version: u32) {
        match global {
            Global::Shm => self.shm = Some(version),
            Global::LinuxDmabuf => self.dmabuf = Some(version),
        }
    }

    /// Returns `true` if at least one buffer path is available.
    #[must_use]
    pub fn has_buffer_path(&self) -> bool {
        self.shm.is_some() || self.dmabuf.is_some()
    }

    /// Returns `true` if feedback objects can be requested.
    #[must_use]
    pub fn supports_feedback(&self) -> bool {
        self.dmabuf.is_some_and(|version| version >= DMABUF_FEEDBACK_VERSION)
    }
}

/// Decoded events that feed display-wide discovery.
#[derive(Debug)]
pub enum DiscoveryEvent {
    /// `wl_shm.format`.
    ShmFormat(u32),
    /// `zwp_linux_dmabuf_v1.format`. Formats are implied by modifier
    /// events, so this is ignored.
    DmabufFormat(u32),
    /// `zwp_linux_dmabuf_v1.modifier`.
    DmabufModifier {
        /// DRM fourcc.
        format: u32,
        /// Advertised modifier.
        modifier: Modifier,
    },
    /// An event of the default feedback object.
    DefaultFeedback(FeedbackEvent),
}

/// Accumulates display-wide formats during connection setup.
#[derive(Debug, Default)]
pub struct FormatDiscovery {
    formats: FormatCatalog,
    default_feedback: bool,
    table: FormatTable,
}

impl FormatDiscovery {
    /// Creates an empty discovery.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes that the default feedback object was requested. Legacy
    /// modifier events are ignored from now on.
    pub fn default_feedback_bound(&mut self) {
        self.default_feedback = true;
    }

    /// Applies one discovery event.
    pub fn dispatch_event(&mut self, event: DiscoveryEvent, support: &dyn RenderSupport) {
        match event {
            DiscoveryEvent::ShmFormat(format) => {
                self.formats.add_shm_format(format, support);
            }
            DiscoveryEvent::DmabufFormat(_) => {}
            DiscoveryEvent::DmabufModifier { format, modifier } => {
                if !self.default_feedback {
                    self.formats.add_drm_format_modifier(format, modifier, support);
                }
            }
            DiscoveryEvent::DefaultFeedback(event) => self.dispatch_feedback(event, support),
        }
    }

    fn dispatch_feedback(&mut self, event: FeedbackEvent, support: &dyn RenderSupport) {
        match event {
            FeedbackEvent::FormatTable(table) => self.table = table,
            FeedbackEvent::TrancheFormats(indices) => {
                if !self.table.is_mapped() {
                    log::warn!(
                        "ignoring {} default feedback formats: no usable format table",
                        indices.len()
                    );
                    return;
                }
                for index in indices {
                    match self.table.resolve(index) {
                        Some((format, modifier)) => {
                            self.formats.add_drm_format_modifier(format, modifier, support);
                        }
                        None => log::warn!("format table index {index} out of range"),
                    }
                }
            }
            // Tranche structure and devices only matter per surface.
            FeedbackEvent::MainDevice(_)
            | FeedbackEvent::TrancheTargetDevice(_)
            | FeedbackEvent::TrancheFlags(_)
            | FeedbackEvent::TrancheDone
            | FeedbackEvent::Done => {}
        }
    }

    /// Formats learned so far.
    #[must_use]
    pub fn formats(&self) -> &FormatCatalog {
        &self.formats
    }

    /// Ends discovery, unmapping the default feedback table.
    ///
    /// With `bgra8_unorm_first`, `B8G8R8A8Unorm` is swapped to the front if
    /// it was discovered.
    #[must_use]
    pub fn finish(self, bgra8_unorm_first: bool) -> FormatCatalog {
        let mut formats = self.formats;
        if bgra8_unorm_first {
            formats.swap_to_front(PixelFormat::B8G8R8A8Unorm);
        }
        formats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AllRenderable;
    use crate::format::{drm, shm};

    #[test]
    fn software_binds_only_shm() {
        assert_eq!(Global::bind_version(WL_SHM, 2, true), Some((Global::Shm, 1)));
        assert_eq!(Global::bind_version(ZWP_LINUX_DMABUF_V1, 4, true), None);
    }

    #[test]
    fn hardware_binds_dmabuf_from_v3_capped_at_v4() {
        assert_eq!(Global::bind_version(WL_SHM, 1, false), None);
        assert_eq!(Global::bind_version(ZWP_LINUX_DMABUF_V1, 2, false), None);
        assert_eq!(
            Global::bind_version(ZWP_LINUX_DMABUF_V1, 3, false),
            Some((Global::LinuxDmabuf, 3))
        );
        assert_eq!(
            Global::bind_version(ZWP_LINUX_DMABUF_V1, 5, false),
            Some((Global::LinuxDmabuf, 4))
        );
    }

    #[test]
    fn globals_report_paths() {
        let mut globals = Globals::default();
        assert!(!globals.has_buffer_path());
        globals.record(Global::LinuxDmabuf, 3);
        assert!(globals.has_buffer_path());
        assert!(!globals.supports_feedback());
        globals.record(Global::LinuxDmabuf, 4);
        assert!(globals.supports_feedback());
    }

    #[test]
    fn legacy_modifiers_ignored_after_default_feedback() {
        let mut discovery = FormatDiscovery::new();
        discovery.dispatch_event(
            DiscoveryEvent::DmabufModifier {
                format: drm::ARGB8888,
                modifier: Modifier(5),
            },
            &AllRenderable,
        );
        discovery.dispatch_event(DiscoveryEvent::DmabufFormat(drm::XRGB8888), &AllRenderable);
        assert_eq!(discovery.formats().len(), 2);

        discovery.default_feedback_bound();
        discovery.dispatch_event(
            DiscoveryEvent::DmabufModifier {
                format: drm::XRGB8888,
                modifier: Modifier(5),
            },
            &AllRenderable,
        );
        assert_eq!(discovery.formats().len(), 2);
    }

    #[test]
    fn default_feedback_tranches_feed_catalog() {
        let mut discovery = FormatDiscovery::new();
        discovery.default_feedback_bound();
        let table = FormatTable::from_records(&[
            (drm::XRGB8888, Modifier::LINEAR),
            (drm::ARGB8888, Modifier::LINEAR),
        ]);
        for event in [
            FeedbackEvent::FormatTable(table),
            FeedbackEvent::TrancheFormats(vec![0, 1, 9]),
            FeedbackEvent::TrancheDone,
            FeedbackEvent::Done,
        ] {
            discovery.dispatch_event(DiscoveryEvent::DefaultFeedback(event), &AllRenderable);
        }

        let formats = discovery.finish(true);
        assert_eq!(formats.iter().next().unwrap().format(), PixelFormat::B8G8R8A8Unorm);
        assert_eq!(formats.surface_formats().count(), 4);
    }

    #[test]
    fn default_feedback_without_table_is_ignored() {
        let mut discovery = FormatDiscovery::new();
        discovery.dispatch_event(
            DiscoveryEvent::DefaultFeedback(FeedbackEvent::TrancheFormats(vec![0])),
            &AllRenderable,
        );
        assert!(discovery.formats().is_empty());
    }

    #[test]
    fn shm_formats_carry_no_modifiers() {
        let mut discovery = FormatDiscovery::new();
        discovery.dispatch_event(DiscoveryEvent::ShmFormat(shm::XRGB8888), &AllRenderable);
        let formats = discovery.finish(false);
        assert!(formats.iter().all(|entry| entry.modifiers().is_empty()));
        assert_eq!(formats.iter().next().unwrap().format(), PixelFormat::B8G8R8Srgb);
    }
}
