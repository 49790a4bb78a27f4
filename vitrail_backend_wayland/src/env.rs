// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Environment configuration.

use vitrail_core::config::WsiConfig;

/// Environment variable holding debug options, e.g. `noshm,bgra8first`.
pub const DEBUG_ENV: &str = "VITRAIL_DEBUG";

/// Applies the debug options in [`DEBUG_ENV`] to `config`.
#[must_use]
pub fn config_from_env(config: WsiConfig) -> WsiConfig {
    with_debug_options(config, std::env::var(DEBUG_ENV).ok().as_deref())
}

fn with_debug_options(mut config: WsiConfig, options: Option<&str>) -> WsiConfig {
    if let Some(options) = options {
        log::debug!("{DEBUG_ENV}={options:?}");
        config.apply_debug_flags(options);
    }
    config
}
