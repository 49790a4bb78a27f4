// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel formats, DRM fourcc codes and layout modifiers.
//!
//! The compositor speaks DRM fourcc codes (and, for `wl_shm`, a variant of
//! them). Renderers speak [`PixelFormat`]s. One fourcc can back several
//! pixel formats: `XRGB8888` is a valid target for the 3- and 4-component
//! BGR formats in both UNORM and SRGB flavours, since SRGB only changes how
//! the renderer encodes values, not the bytes the compositor sees.
//!
//! Vulkan-style `_PACKn` formats share the DRM component order only on
//! little-endian hosts, so the packed 16/32-bit mappings are compiled out on
//! big-endian targets.

use core::fmt;

use bitflags::bitflags;

/// Builds a DRM fourcc code from its four ASCII characters.
#[must_use]
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

/// DRM fourcc codes used by the format mapping.
#[expect(missing_docs, reason = "names are the DRM_FORMAT_* constants")]
pub mod drm {
    use super::fourcc;

    pub const RGBA4444: u32 = fourcc(b"RA12");
    pub const RGBX4444: u32 = fourcc(b"RX12");
    pub const BGRA4444: u32 = fourcc(b"BA12");
    pub const BGRX4444: u32 = fourcc(b"BX12");
    pub const RGB565: u32 = fourcc(b"RG16");
    pub const BGR565: u32 = fourcc(b"BG16");
    pub const ARGB1555: u32 = fourcc(b"AR15");
    pub const XRGB1555: u32 = fourcc(b"XR15");
    pub const RGBA5551: u32 = fourcc(b"RA15");
    pub const RGBX5551: u32 = fourcc(b"RX15");
    pub const BGRA5551: u32 = fourcc(b"BA15");
    pub const BGRX5551: u32 = fourcc(b"BX15");
    pub const ARGB2101010: u32 = fourcc(b"AR30");
    pub const XRGB2101010: u32 = fourcc(b"XR30");
    pub const ABGR2101010: u32 = fourcc(b"AB30");
    pub const XBGR2101010: u32 = fourcc(b"XB30");
    pub const XBGR8888: u32 = fourcc(b"XB24");
    pub const ABGR8888: u32 = fourcc(b"AB24");
    pub const XRGB8888: u32 = fourcc(b"XR24");
    pub const ARGB8888: u32 = fourcc(b"AR24");
    pub const BGRX8888: u32 = fourcc(b"BX24");
}

/// `wl_shm` format codes that differ from their DRM counterparts.
pub mod shm {
    /// `WL_SHM_FORMAT_ARGB8888`.
    pub const ARGB8888: u32 = 0;
    /// `WL_SHM_FORMAT_XRGB8888`.
    pub const XRGB8888: u32 = 1;
}

/// Converts a `wl_shm` format code to the DRM fourcc it denotes.
///
/// The two enumerations are identical except for ARGB8888 and XRGB8888.
#[must_use]
pub const fn drm_format_for_shm(shm_format: u32) -> u32 {
    match shm_format {
        shm::ARGB8888 => drm::ARGB8888,
        shm::XRGB8888 => drm::XRGB8888,
        other => other,
    }
}

/// Converts a DRM fourcc to the `wl_shm` code for the same layout.
#[must_use]
pub const fn shm_format_for_drm(drm_format: u32) -> u32 {
    match drm_format {
        drm::ARGB8888 => shm::ARGB8888,
        drm::XRGB8888 => shm::XRGB8888,
        other => other,
    }
}

/// A 64-bit DRM format modifier describing tiling/compression layout.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Modifier(pub u64);

impl Modifier {
    /// Plain row-major layout.
    pub const LINEAR: Self = Self(0);
    /// `DRM_FORMAT_MOD_INVALID`: the layout is implied by the buffer.
    ///
    /// Never stored in a format catalog.
    pub const INVALID: Self = Self(0x00ff_ffff_ffff_ffff);

    /// Joins the two halves the protocol transmits.
    #[must_use]
    pub const fn from_hi_lo(hi: u32, lo: u32) -> Self {
        Self(((hi as u64) << 32) | lo as u64)
    }

    /// High 32 bits, as sent in `zwp_linux_buffer_params_v1.add`.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "shifted value fits in 32 bits"
    )]
    pub const fn hi(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Low 32 bits, as sent in `zwp_linux_buffer_params_v1.add`.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "keeps the low half")]
    pub const fn lo(self) -> u32 {
        self.0 as u32
    }

    /// Returns `true` for [`Modifier::INVALID`].
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.0 == Self::INVALID.0
    }
}

impl fmt::Debug for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modifier({:#018x})", self.0)
    }
}

bitflags! {
    /// Which composition modes a catalog entry can serve.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FormatFlags: u32 {
        /// Backed by a fourcc with an alpha channel.
        const ALPHA = 1 << 0;
        /// Backed by a fourcc whose alpha bits are ignored.
        const OPAQUE = 1 << 1;
    }
}

/// Renderer-side pixel formats that can back a compositor buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[expect(missing_docs, reason = "variant names are the format layouts")]
pub enum PixelFormat {
    R4G4B4A4UnormPack16,
    B4G4R4A4UnormPack16,
    R5G6B5UnormPack16,
    B5G6R5UnormPack16,
    A1R5G5B5UnormPack16,
    R5G5B5A1UnormPack16,
    B5G5R5A1UnormPack16,
    A2R10G10B10UnormPack32,
    A2B10G10R10UnormPack32,
    R8G8B8Unorm,
    R8G8B8Srgb,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    B8G8R8Unorm,
    B8G8R8Srgb,
    B8G8R8A8Unorm,
    B8G8R8A8Srgb,
}

/// The color space every advertised surface format is reported in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    /// sRGB primaries with the sRGB transfer function.
    SrgbNonlinear,
}

const AO: FormatFlags = FormatFlags::ALPHA.union(FormatFlags::OPAQUE);
const A: FormatFlags = FormatFlags::ALPHA;
const O: FormatFlags = FormatFlags::OPAQUE;

impl PixelFormat {
    /// Returns every pixel format `drm_format` can back, with the
    /// composition modes it provides for each.
    ///
    /// Unknown fourccs map to an empty slice.
    #[must_use]
    pub fn for_drm_format(drm_format: u32) -> &'static [(Self, FormatFlags)] {
        use PixelFormat::*;

        #[cfg(target_endian = "little")]
        match drm_format {
            drm::RGBA4444 => return &[(R4G4B4A4UnormPack16, A)],
            drm::RGBX4444 => return &[(R4G4B4A4UnormPack16, O)],
            drm::BGRA4444 => return &[(B4G4R4A4UnormPack16, A)],
            drm::BGRX4444 => return &[(B4G4R4A4UnormPack16, O)],
            drm::RGB565 => return &[(R5G6B5UnormPack16, AO)],
            drm::BGR565 => return &[(B5G6R5UnormPack16, AO)],
            drm::ARGB1555 => return &[(A1R5G5B5UnormPack16, A)],
            drm::XRGB1555 => return &[(A1R5G5B5UnormPack16, O)],
            drm::RGBA5551 => return &[(R5G5B5A1UnormPack16, A)],
            drm::RGBX5551 => return &[(R5G5B5A1UnormPack16, O)],
            drm::BGRA5551 => return &[(B5G5R5A1UnormPack16, A)],
            drm::BGRX5551 => return &[(B5G5R5A1UnormPack16, O)],
            drm::ARGB2101010 => return &[(A2R10G10B10UnormPack32, A)],
            drm::XRGB2101010 => return &[(A2R10G10B10UnormPack32, O)],
            drm::ABGR2101010 => return &[(A2B10G10R10UnormPack32, A)],
            drm::XBGR2101010 => return &[(A2B10G10R10UnormPack32, O)],
            _ => {}
        }

        // 8-bit channel formats list components in memory byte order, the
        // reverse of the little-endian DRM naming.
        match drm_format {
            drm::XBGR8888 => &[
                (R8G8B8Srgb, AO),
                (R8G8B8Unorm, AO),
                (R8G8B8A8Srgb, O),
                (R8G8B8A8Unorm, O),
            ],
            drm::ABGR8888 => &[(R8G8B8A8Srgb, A), (R8G8B8A8Unorm, A)],
            drm::XRGB8888 => &[
                (B8G8R8Srgb, AO),
                (B8G8R8Unorm, AO),
                (B8G8R8A8Srgb, O),
                (B8G8R8A8Unorm, O),
            ],
            drm::ARGB8888 => &[(B8G8R8A8Srgb, A), (B8G8R8A8Unorm, A)],
            _ => &[],
        }
    }

    /// Returns the DRM fourcc a buffer of this format is shared as.
    ///
    /// `alpha` selects the alpha-carrying fourcc where one exists.
    #[must_use]
    pub const fn drm_format(self, alpha: bool) -> u32 {
        use PixelFormat::*;

        const fn pick(alpha: bool, with: u32, without: u32) -> u32 {
            if alpha { with } else { without }
        }

        match self {
            R4G4B4A4UnormPack16 => pick(alpha, drm::RGBA4444, drm::RGBX4444),
            B4G4R4A4UnormPack16 => pick(alpha, drm::BGRA4444, drm::BGRX4444),
            R5G6B5UnormPack16 => drm::RGB565,
            B5G6R5UnormPack16 => drm::BGR565,
            A1R5G5B5UnormPack16 => pick(alpha, drm::ARGB1555, drm::XRGB1555),
            R5G5B5A1UnormPack16 => pick(alpha, drm::RGBA5551, drm::RGBX5551),
            B5G5R5A1UnormPack16 => pick(alpha, drm::BGRA5551, drm::BGRX5551),
            A2R10G10B10UnormPack32 => pick(alpha, drm::ARGB2101010, drm::XRGB2101010),
            A2B10G10R10UnormPack32 => pick(alpha, drm::ABGR2101010, drm::XBGR2101010),
            R8G8B8Unorm | R8G8B8Srgb => drm::XBGR8888,
            R8G8B8A8Unorm | R8G8B8A8Srgb => pick(alpha, drm::ABGR8888, drm::XBGR8888),
            B8G8R8Unorm | B8G8R8Srgb => drm::BGRX8888,
            B8G8R8A8Unorm | B8G8R8A8Srgb => pick(alpha, drm::ARGB8888, drm::XRGB8888),
        }
    }

    /// Returns the `wl_shm` format code for this format.
    #[must_use]
    pub const fn shm_format(self, alpha: bool) -> u32 {
        shm_format_for_drm(self.drm_format(alpha))
    }

    /// Bytes per pixel of the single plane.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        use PixelFormat::*;

        match self {
            R4G4B4A4UnormPack16 | B4G4R4A4UnormPack16 | R5G6B5UnormPack16
            | B5G6R5UnormPack16 | A1R5G5B5UnormPack16 | R5G5B5A1UnormPack16
            | B5G5R5A1UnormPack16 => 2,
            R8G8B8Unorm | R8G8B8Srgb | B8G8R8Unorm | B8G8R8Srgb => 3,
            A2R10G10B10UnormPack32 | A2B10G10R10UnormPack32 | R8G8B8A8Unorm
            | R8G8B8A8Srgb | B8G8R8A8Unorm | B8G8R8A8Srgb => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_matches_drm_encoding() {
        // DRM_FORMAT_XRGB8888 is 0x34325258.
        assert_eq!(drm::XRGB8888, 0x3432_5258);
        assert_eq!(drm::ARGB8888, 0x3432_5241);
    }

    #[test]
    fn shm_codes_differ_only_for_8888() {
        assert_eq!(drm_format_for_shm(shm::ARGB8888), drm::ARGB8888);
        assert_eq!(drm_format_for_shm(shm::XRGB8888), drm::XRGB8888);
        assert_eq!(drm_format_for_shm(drm::XBGR8888), drm::XBGR8888);
        assert_eq!(shm_format_for_drm(drm::XRGB8888), shm::XRGB8888);
        assert_eq!(shm_format_for_drm(drm::RGB565), drm::RGB565);
    }

    #[test]
    fn modifier_halves_round_trip() {
        let modifier = Modifier(0x0100_0000_0000_0002);
        assert_eq!(modifier.hi(), 0x0100_0000);
        assert_eq!(modifier.lo(), 2);
        assert_eq!(Modifier::from_hi_lo(modifier.hi(), modifier.lo()), modifier);
        assert!(Modifier::from_hi_lo(0x00ff_ffff, 0xffff_ffff).is_invalid());
    }

    #[test]
    fn xrgb8888_backs_opaque_and_alpha_bgr() {
        let formats = PixelFormat::for_drm_format(drm::XRGB8888);
        assert!(formats.contains(&(PixelFormat::B8G8R8A8Unorm, FormatFlags::OPAQUE)));
        assert!(formats.contains(&(
            PixelFormat::B8G8R8Unorm,
            FormatFlags::ALPHA | FormatFlags::OPAQUE
        )));
        assert_eq!(
            PixelFormat::for_drm_format(drm::ARGB8888),
            &[
                (PixelFormat::B8G8R8A8Srgb, FormatFlags::ALPHA),
                (PixelFormat::B8G8R8A8Unorm, FormatFlags::ALPHA),
            ]
        );
    }

    #[test]
    fn unknown_fourcc_maps_to_nothing() {
        assert!(PixelFormat::for_drm_format(fourcc(b"NV12")).is_empty());
    }

    #[test]
    fn reverse_mapping_respects_alpha() {
        assert_eq!(PixelFormat::B8G8R8A8Srgb.drm_format(true), drm::ARGB8888);
        assert_eq!(PixelFormat::B8G8R8A8Srgb.drm_format(false), drm::XRGB8888);
        assert_eq!(PixelFormat::B8G8R8A8Unorm.shm_format(true), shm::ARGB8888);
        assert_eq!(PixelFormat::R5G6B5UnormPack16.drm_format(true), drm::RGB565);
    }

    #[cfg(target_endian = "little")]
    #[test]
    fn packed_formats_are_mapped_on_little_endian() {
        assert_eq!(
            PixelFormat::for_drm_format(drm::XBGR2101010),
            &[(PixelFormat::A2B10G10R10UnormPack32, FormatFlags::OPAQUE)]
        );
    }
}
