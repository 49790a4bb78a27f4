// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deduplicated format/modifier catalog.
//!
//! A [`FormatCatalog`] records which [`PixelFormat`]s the compositor accepts,
//! which composition modes ([`FormatFlags`]) each one serves, and the set of
//! layout [`Modifier`]s advertised for it. Entries are unique by pixel
//! format; repeated insertion unions the flags. Insertion order is kept,
//! because the first entries are what applications see first.
//!
//! The catalog has no protocol knowledge. Feeding it from `wl_shm` formats,
//! legacy modifier events or feedback tranches is the caller's job, via
//! [`FormatCatalog::add_drm_format_modifier`].

use crate::format::{ColorSpace, FormatFlags, Modifier, PixelFormat};

/// Answers whether the rendering device can draw into a pixel format.
///
/// Formats the device cannot render to are never entered into a catalog.
pub trait RenderSupport {
    /// Returns `true` if `format` can be used as a color attachment.
    fn is_renderable(&self, format: PixelFormat) -> bool;
}

impl<F> RenderSupport for F
where
    F: Fn(PixelFormat) -> bool,
{
    fn is_renderable(&self, format: PixelFormat) -> bool {
        self(format)
    }
}

/// A [`RenderSupport`] that accepts every format.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllRenderable;

impl RenderSupport for AllRenderable {
    fn is_renderable(&self, _format: PixelFormat) -> bool {
        true
    }
}

/// One pixel format the compositor can consume.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatEntry {
    format: PixelFormat,
    flags: FormatFlags,
    modifiers: Vec<Modifier>,
}

impl FormatEntry {
    fn new(format: PixelFormat, flags: FormatFlags) -> Self {
        Self {
            format,
            flags,
            modifiers: Vec::new(),
        }
    }

    /// The pixel format this entry describes.
    #[must_use]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Union of the composition modes seen for this format.
    #[must_use]
    pub fn flags(&self) -> FormatFlags {
        self.flags
    }

    /// Modifiers advertised for this format, in arrival order.
    #[must_use]
    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    /// Records `modifier`, ignoring duplicates and [`Modifier::INVALID`].
    pub fn add_modifier(&mut self, modifier: Modifier) {
        if modifier.is_invalid() || self.modifiers.contains(&modifier) {
            return;
        }
        if self.modifiers.try_reserve(1).is_err() {
            log::warn!("dropping modifier {modifier:?} for {:?}: out of memory", self.format);
            return;
        }
        self.modifiers.push(modifier);
    }
}

/// Ordered, deduplicated collection of [`FormatEntry`] values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormatCatalog {
    entries: Vec<FormatEntry>,
}

impl FormatCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Returns the entry for `format`, inserting it if needed.
    ///
    /// An existing entry gets `flags` unioned in. A new entry is only
    /// created if `support` says the device can render to `format`;
    /// otherwise, or if memory is exhausted, returns `None` and the catalog
    /// is unchanged.
    pub fn add(
        &mut self,
        format: PixelFormat,
        flags: FormatFlags,
        support: &dyn RenderSupport,
    ) -> Option<&mut FormatEntry> {
        debug_assert!(!flags.is_empty(), "catalog entries need a composition mode");

        if let Some(index) = self.position(format) {
            let entry = &mut self.entries[index];
            entry.flags |= flags;
            return Some(entry);
        }

        if !support.is_renderable(format) {
            return None;
        }
        if self.entries.try_reserve(1).is_err() {
            log::warn!("dropping format {format:?}: out of memory");
            return None;
        }
        self.entries.push(FormatEntry::new(format, flags));
        self.entries.last_mut()
    }

    /// Inserts `format` with `flags` and records `modifier` on it.
    pub fn add_with_modifier(
        &mut self,
        format: PixelFormat,
        flags: FormatFlags,
        modifier: Modifier,
        support: &dyn RenderSupport,
    ) {
        if let Some(entry) = self.add(format, flags, support) {
            entry.add_modifier(modifier);
        }
    }

    /// Records a compositor-advertised (DRM fourcc, modifier) pair under
    /// every pixel format the fourcc can back.
    ///
    /// Unknown fourccs are ignored.
    pub fn add_drm_format_modifier(
        &mut self,
        drm_format: u32,
        modifier: Modifier,
        support: &dyn RenderSupport,
    ) {
        for &(format, flags) in PixelFormat::for_drm_format(drm_format) {
            self.add_with_modifier(format, flags, modifier, support);
        }
    }

    /// Records a `wl_shm` format. Shared-memory buffers carry no modifier.
    pub fn add_shm_format(&mut self, shm_format: u32, support: &dyn RenderSupport) {
        let drm_format = crate::format::drm_format_for_shm(shm_format);
        self.add_drm_format_modifier(drm_format, Modifier::INVALID, support);
    }

    /// Looks up the entry for `format`.
    #[must_use]
    pub fn find(&self, format: PixelFormat) -> Option<&FormatEntry> {
        self.entries.iter().find(|entry| entry.format == format)
    }

    /// Swaps the entry for `format` into the first position.
    ///
    /// Returns `false` if the catalog has no such entry.
    pub fn swap_to_front(&mut self, format: PixelFormat) -> bool {
        match self.position(format) {
            Some(index) => {
                self.entries.swap(0, index);
                true
            }
            None => false,
        }
    }

    /// Iterates entries in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &FormatEntry> {
        self.entries.iter()
    }

    /// Number of distinct pixel formats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Formats usable for both opaque and alpha composition, as reported to
    /// applications.
    pub fn surface_formats(&self) -> impl Iterator<Item = (PixelFormat, ColorSpace)> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.flags.contains(FormatFlags::ALPHA | FormatFlags::OPAQUE))
            .map(|entry| (entry.format, ColorSpace::SrgbNonlinear))
    }

    fn position(&self, format: PixelFormat) -> Option<usize> {
        self.entries.iter().position(|entry| entry.format == format)
    }
}

/// Returns `true` if `a` and `b` hold the same modifiers, ignoring order.
///
/// Both sides come from deduplicated lists, so equal lengths plus one-way
/// containment is sufficient.
#[must_use]
pub fn same_modifier_set(a: &[Modifier], b: &[Modifier]) -> bool {
    a.len() == b.len() && a.iter().all(|modifier| b.contains(modifier))
}
