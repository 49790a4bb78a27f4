// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Surface capability queries.
//!
//! These answer what a window system integration layer reports before any
//! swapchain exists. Queries that need the compositor open a short-lived
//! [`Display`] of their own and drop it before returning.

use bitflags::bitflags;

use crate::backend::Platform;
use crate::catalog::RenderSupport;
use crate::config::WsiConfig;
use crate::display::{Display, DisplayRequest};
use crate::error::WsiError;
use crate::format::{ColorSpace, PixelFormat};
use crate::geometry::{Extent, Rect2D};
use crate::swapchain::PresentMode;

/// Fewest images a swapchain should have to never stall: one scanned out,
/// one queued, one held by the compositor and one being rendered.
pub const MIN_IMAGE_COUNT: u32 = 4;

bitflags! {
    /// Surface transforms.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SurfaceTransforms: u32 {
        /// No transform.
        const IDENTITY = 1 << 0;
    }
}

bitflags! {
    /// Composite alpha modes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct CompositeAlphaModes: u32 {
        /// Alpha is ignored.
        const OPAQUE = 1 << 0;
        /// Color is premultiplied by alpha.
        const PRE_MULTIPLIED = 1 << 1;
    }
}

bitflags! {
    /// Ways swapchain images can be used.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        /// Source of a transfer.
        const TRANSFER_SRC = 1 << 0;
        /// Destination of a transfer.
        const TRANSFER_DST = 1 << 1;
        /// Sampled in a shader.
        const SAMPLED = 1 << 2;
        /// Storage image.
        const STORAGE = 1 << 3;
        /// Color attachment.
        const COLOR_ATTACHMENT = 1 << 4;
        /// Input attachment.
        const INPUT_ATTACHMENT = 1 << 7;
    }
}

/// What a surface supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    /// Fewest images per swapchain.
    pub min_image_count: u32,
    /// Most images per swapchain, 0 for no limit.
    pub max_image_count: u32,
    /// Current surface size. [`Extent::UNDEFINED`]: the swapchain decides.
    pub current_extent: Extent,
    /// Smallest image size.
    pub min_image_extent: Extent,
    /// Largest image size.
    pub max_image_extent: Extent,
    /// Most array layers per image.
    pub max_image_array_layers: u32,
    /// Supported transforms.
    pub supported_transforms: SurfaceTransforms,
    /// Transform applied when none is requested.
    pub current_transform: SurfaceTransforms,
    /// Supported composite alpha modes.
    pub supported_composite_alpha: CompositeAlphaModes,
    /// Supported image usages.
    pub supported_usage: ImageUsage,
    /// Protected content can be presented.
    pub supports_protected: bool,
}

/// Whether a query wrote every available element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completeness {
    /// Everything fit.
    Complete,
    /// The output was too short; the rest was dropped.
    Incomplete,
}

/// Returns `true` if the compositor offers a buffer path for this device.
///
/// Opens and closes a connection without collecting formats.
#[must_use]
pub fn query_support<P: Platform>(platform: &P, config: &WsiConfig) -> bool {
    let request = DisplayRequest {
        get_format_list: false,
        software: config.software,
        bgra8_unorm_first: false,
    };
    match Display::open(platform, request, &crate::catalog::AllRenderable) {
        Ok(_) => true,
        Err(err) => {
            log::debug!("presentation unsupported: {err}");
            false
        }
    }
}

/// Whether a queue family can present. Always true on this platform.
#[must_use]
pub fn surface_support() -> bool {
    true
}

/// Surface capabilities for a device.
#[must_use]
pub fn surface_capabilities(config: &WsiConfig) -> SurfaceCapabilities {
    let max = config.max_image_dimension;
    SurfaceCapabilities {
        min_image_count: MIN_IMAGE_COUNT,
        max_image_count: 0,
        current_extent: Extent::UNDEFINED,
        min_image_extent: Extent::new(1, 1),
        max_image_extent: Extent::new(max, max),
        max_image_array_layers: 1,
        supported_transforms: SurfaceTransforms::IDENTITY,
        current_transform: SurfaceTransforms::IDENTITY,
        supported_composite_alpha: CompositeAlphaModes::OPAQUE
            | CompositeAlphaModes::PRE_MULTIPLIED,
        supported_usage: ImageUsage::TRANSFER_SRC
            | ImageUsage::SAMPLED
            | ImageUsage::TRANSFER_DST
            | ImageUsage::STORAGE
            | ImageUsage::COLOR_ATTACHMENT
            | ImageUsage::INPUT_ATTACHMENT,
        supports_protected: false,
    }
}

/// Formats that can be presented with either alpha mode, in catalog order.
///
/// Fails with [`WsiError::SurfaceLost`] if no connection can be set up.
pub fn surface_formats<P: Platform>(
    platform: &P,
    config: &WsiConfig,
    support: &dyn RenderSupport,
) -> Result<Vec<(PixelFormat, ColorSpace)>, WsiError> {
    let request = DisplayRequest {
        get_format_list: true,
        software: config.software,
        bgra8_unorm_first: config.force_bgra8_unorm_first,
    };
    let display = Display::open(platform, request, support).map_err(|err| {
        log::warn!("format query failed: {err}");
        WsiError::SurfaceLost
    })?;
    Ok(display.formats().surface_formats().collect())
}

/// Supported present modes.
#[must_use]
pub fn present_modes() -> &'static [PresentMode] {
    &[PresentMode::Mailbox, PresentMode::Fifo]
}

/// Copies the supported present modes into `out`.
pub fn write_present_modes(out: &mut [PresentMode]) -> (usize, Completeness) {
    write_truncated(present_modes(), out)
}

/// Regions a swapchain image may be presented to.
///
/// The surface size is not known, so this is one rectangle of undefined
/// size at the origin.
#[must_use]
pub fn present_rectangles() -> [Rect2D; 1] {
    [Rect2D {
        x: 0,
        y: 0,
        extent: Extent::UNDEFINED,
    }]
}

/// Copies as much of `items` as fits into `out`.
pub fn write_truncated<T: Copy>(items: &[T], out: &mut [T]) -> (usize, Completeness) {
    let count = items.len().min(out.len());
    out[..count].copy_from_slice(&items[..count]);
    let completeness = if count < items.len() {
        Completeness::Incomplete
    } else {
        Completeness::Complete
    };
    (count, completeness)
}
