// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Double-buffered dma-buf feedback.
//!
//! The compositor describes its buffer preferences for a surface as a burst
//! of events: an optional format table, the main device, then one group of
//! events per tranche, and finally `done`. [`SurfaceFeedback`] accumulates a
//! burst into a pending [`FeedbackState`] and swaps it in as the current
//! state only when `done` arrives, so a half-received burst is never
//! observable.
//!
//! ```text
//!   format_table? main_device? (target_device flags formats* tranche_done)* done
//!   \_________________________ pending ____________________________________/   |
//!                                                                 current <-----+
//! ```

use core::fmt;

use bitflags::bitflags;

use crate::catalog::{FormatCatalog, FormatEntry, RenderSupport};
use crate::format::PixelFormat;
use crate::table::FormatTable;

/// Opaque device number (`dev_t`). Zero means unknown.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceId(pub u64);

impl DeviceId {
    /// The "not advertised" device.
    pub const UNKNOWN: Self = Self(0);

    /// Decodes a `dev_t` sent as a `wl_array` of host-order bytes.
    ///
    /// Returns `None` if the array is shorter than a `dev_t`.
    #[must_use]
    pub fn from_ne_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
        Some(Self(u64::from_ne_bytes(raw)))
    }

    /// Returns `true` unless this is [`DeviceId::UNKNOWN`].
    #[must_use]
    pub const fn is_known(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({:#x})", self.0)
    }
}

bitflags! {
    /// `zwp_linux_dmabuf_feedback_v1.tranche_flags`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TrancheFlags: u32 {
        /// Buffers in this tranche may be scanned out directly.
        const SCANOUT = 1 << 0;
        const _ = !0;
    }
}

/// One ranked group of compositor preferences.
#[derive(Clone, Debug, Default)]
pub struct Tranche {
    target_device: DeviceId,
    flags: TrancheFlags,
    formats: FormatCatalog,
}

impl Tranche {
    /// Device the buffers of this tranche should be allocated on.
    #[must_use]
    pub fn target_device(&self) -> DeviceId {
        self.target_device
    }

    /// Tranche flags.
    #[must_use]
    pub fn flags(&self) -> TrancheFlags {
        self.flags
    }

    /// Formats and modifiers advertised in this tranche.
    #[must_use]
    pub fn formats(&self) -> &FormatCatalog {
        &self.formats
    }
}

/// A complete feedback burst.
#[derive(Debug, Default)]
pub struct FeedbackState {
    main_device: DeviceId,
    tranches: Vec<Tranche>,
    format_table: FormatTable,
}

impl FeedbackState {
    /// Main device of the compositor, [`DeviceId::UNKNOWN`] until advertised.
    #[must_use]
    pub fn main_device(&self) -> DeviceId {
        self.main_device
    }

    /// Tranches in preference order, most preferred first.
    #[must_use]
    pub fn tranches(&self) -> &[Tranche] {
        &self.tranches
    }

    /// Table the tranche indices of this burst were resolved against.
    #[must_use]
    pub fn format_table(&self) -> &FormatTable {
        &self.format_table
    }

    /// Returns the entry for `format` from the most preferred tranche that
    /// lists it.
    ///
    /// Feedback that never named a main device is treated as absent.
    #[must_use]
    pub fn pick_format(&self, format: PixelFormat) -> Option<&FormatEntry> {
        if !self.main_device.is_known() {
            return None;
        }
        self.tranches
            .iter()
            .find_map(|tranche| tranche.formats.find(format))
    }
}

/// One decoded `zwp_linux_dmabuf_feedback_v1` event.
#[derive(Debug)]
pub enum FeedbackEvent {
    /// `format_table`, already mapped by the transport.
    FormatTable(FormatTable),
    /// `main_device`.
    MainDevice(DeviceId),
    /// `tranche_target_device`.
    TrancheTargetDevice(DeviceId),
    /// `tranche_flags`.
    TrancheFlags(TrancheFlags),
    /// `tranche_formats`, as table indices.
    TrancheFormats(Vec<u16>),
    /// `tranche_done`.
    TrancheDone,
    /// `done`.
    Done,
}

/// What a dispatched event did to the feedback state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedbackDelta {
    /// Only the pending state changed.
    Accumulated,
    /// The pending state became current.
    Committed,
}

/// Pending/current feedback for one surface.
#[derive(Debug, Default)]
pub struct SurfaceFeedback {
    current: FeedbackState,
    pending: FeedbackState,
    pending_tranche: Tranche,
    commits: u64,
}

impl SurfaceFeedback {
    /// Creates feedback with nothing received yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The last committed state.
    #[must_use]
    pub fn current(&self) -> &FeedbackState {
        &self.current
    }

    /// Number of completed bursts.
    #[must_use]
    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Applies one event.
    ///
    /// `support` filters tranche formats the device cannot render to.
    pub fn dispatch_event(
        &mut self,
        event: FeedbackEvent,
        support: &dyn RenderSupport,
    ) -> FeedbackDelta {
        match event {
            FeedbackEvent::FormatTable(table) => {
                self.pending.format_table = table;
            }
            FeedbackEvent::MainDevice(device) => {
                self.pending.main_device = device;
            }
            FeedbackEvent::TrancheTargetDevice(device) => {
                self.pending_tranche.target_device = device;
            }
            FeedbackEvent::TrancheFlags(flags) => {
                self.pending_tranche.flags = flags;
            }
            FeedbackEvent::TrancheFormats(indices) => {
                self.add_tranche_formats(&indices, support);
            }
            FeedbackEvent::TrancheDone => {
                let tranche = core::mem::take(&mut self.pending_tranche);
                self.pending.tranches.push(tranche);
            }
            FeedbackEvent::Done => {
                self.current = core::mem::take(&mut self.pending);
                self.pending_tranche = Tranche::default();
                self.commits += 1;
                log::debug!(
                    "surface feedback committed: main device {:?}, {} tranches",
                    self.current.main_device,
                    self.current.tranches.len()
                );
                return FeedbackDelta::Committed;
            }
        }
        FeedbackDelta::Accumulated
    }

    fn add_tranche_formats(&mut self, indices: &[u16], support: &dyn RenderSupport) {
        // A burst without its own table reuses the last committed one.
        if self.pending.format_table.is_absent() {
            self.pending.format_table = self.current.format_table.take();
        }
        let table = &self.pending.format_table;
        if !table.is_mapped() {
            log::warn!("dropping {} tranche formats: no usable format table", indices.len());
            return;
        }
        for &index in indices {
            match table.resolve(index) {
                Some((drm_format, modifier)) => {
                    self.pending_tranche
                        .formats
                        .add_drm_format_modifier(drm_format, modifier, support);
                }
                None => log::warn!(
                    "format table index {index} out of range ({} records)",
                    table.len()
                ),
            }
        }
    }
}
