// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wayland backend for vitrail.
//!
//! Implements the `vitrail_core` transport contract on `wayland-client`:
//!
//! - `wl_shm` and `zwp_linux_dmabuf_v1` (v3 and v4) global binding
//! - default and per-surface `zwp_linux_dmabuf_feedback_v1`, with the
//!   format table mapped read-only
//! - memfd-backed `wl_shm` buffers and `create_immed` dma-buf buffers
//! - `wl_surface` attach, damage, frame callbacks and commit
//! - the `prepare_read` / `poll` / `read` discipline on a private queue
//!
//! ```no_run
//! use vitrail_backend_wayland::{WaylandPlatform, config_from_env};
//! use vitrail_core::catalog::AllRenderable;
//! use vitrail_core::config::WsiConfig;
//! use vitrail_core::surface::Surface;
//! # fn demo(
//! #     connection: wayland_client::Connection,
//! #     wl_surface: wayland_client::protocol::wl_surface::WlSurface,
//! # ) {
//! let config = config_from_env(WsiConfig::default().with_modifiers(true));
//! let platform = WaylandPlatform::new(connection, wl_surface);
//! let surface = Surface::new(platform, config, Box::new(AllRenderable));
//! # let _ = surface;
//! # }
//! ```

mod dispatch;
mod env;
mod event_loop;
mod platform;
mod shm;
mod time;

pub use env::{DEBUG_ENV, config_from_env};
pub use platform::{WaylandBackend, WaylandPlatform};
pub use shm::{MappedTable, ShmRegion};
pub use time::now;
