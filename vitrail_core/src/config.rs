// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Device capabilities and debug knobs that steer presentation.

/// Presentation configuration supplied by the rendering device.
///
/// The engine never probes the device itself; these flags decide which
/// buffer path a swapchain uses and what the capability queries report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WsiConfig {
    /// The device renders on the CPU. Selects the `wl_shm` buffer paths.
    pub software: bool,
    /// The device can allocate images with explicit DRM format modifiers.
    pub supports_modifiers: bool,
    /// The device can render straight into imported host memory.
    pub has_import_memory_host: bool,
    /// Never render into shared memory directly; copy on present instead.
    pub no_shm: bool,
    /// Move `B8G8R8A8Unorm` to the front of the advertised format list.
    pub force_bgra8_unorm_first: bool,
    /// Largest 2D image dimension the device supports.
    pub max_image_dimension: u32,
}

impl Default for WsiConfig {
    fn default() -> Self {
        Self {
            software: false,
            supports_modifiers: false,
            has_import_memory_host: false,
            no_shm: false,
            force_bgra8_unorm_first: false,
            max_image_dimension: 16384,
        }
    }
}

impl WsiConfig {
    /// Sets [`WsiConfig::software`].
    #[must_use]
    pub const fn with_software(mut self, software: bool) -> Self {
        self.software = software;
        self
    }

    /// Sets [`WsiConfig::supports_modifiers`].
    #[must_use]
    pub const fn with_modifiers(mut self, supports_modifiers: bool) -> Self {
        self.supports_modifiers = supports_modifiers;
        self
    }

    /// Sets [`WsiConfig::has_import_memory_host`].
    #[must_use]
    pub const fn with_import_memory_host(mut self, has_import_memory_host: bool) -> Self {
        self.has_import_memory_host = has_import_memory_host;
        self
    }

    /// Sets [`WsiConfig::max_image_dimension`].
    #[must_use]
    pub const fn with_max_image_dimension(mut self, max_image_dimension: u32) -> Self {
        self.max_image_dimension = max_image_dimension;
        self
    }

    /// Applies a debug option string such as `"noshm,bgra8first"`.
    ///
    /// Options are separated by commas, semicolons, colons or spaces.
    /// Unknown options are logged and ignored.
    pub fn apply_debug_flags(&mut self, flags: &str) {
        for flag in flags
            .split([',', ';', ':', ' '])
            .filter(|flag| !flag.is_empty())
        {
            match flag {
                "noshm" => self.no_shm = true,
                "bgra8first" => self.force_bgra8_unorm_first = true,
                other => log::debug!("ignoring unknown debug option {other:?}"),
            }
        }
    }
}
