// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Extents and damage rectangles.

/// Width and height in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extent {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent {
    /// An extent whose size is decided by the swapchain, not the surface.
    pub const UNDEFINED: Self = Self::new(u32::MAX, u32::MAX);

    /// Creates an extent.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A rectangle in surface coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect2D {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Size of the rectangle.
    pub extent: Extent,
}

/// A rectangle on one array layer of an image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RectLayer {
    /// Left edge in buffer coordinates.
    pub x: i32,
    /// Top edge in buffer coordinates.
    pub y: i32,
    /// Size of the rectangle.
    pub extent: Extent,
    /// Array layer. Surfaces only have layer 0.
    pub layer: u32,
}

impl RectLayer {
    /// Creates a rectangle on layer 0.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            extent: Extent::new(width, height),
            layer: 0,
        }
    }

    /// Width and height clamped to the protocol's signed range.
    #[must_use]
    pub fn protocol_size(&self) -> (i32, i32) {
        (
            i32::try_from(self.extent.width).unwrap_or(i32::MAX),
            i32::try_from(self.extent.height).unwrap_or(i32::MAX),
        )
    }
}
