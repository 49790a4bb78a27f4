// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Format negotiation and swapchain image lifecycle for presenting rendered
//! images to a compositor.
//!
//! `vitrail_core` is the protocol-independent half of a window system
//! integration layer. It decides which pixel formats and DRM modifiers to
//! allocate with, tracks the compositor's live dma-buf feedback, and runs
//! the acquire/present/release cycle of swapchain images. The wire protocol
//! and the image allocator are reached through traits, implemented for
//! Wayland by `vitrail_backend_wayland`.
//!
//! # Architecture
//!
//! ```text
//!   Platform::connect ──► Display::open ──► FormatCatalog
//!                              │
//!                              ▼
//!   Surface::init ──► SurfaceFeedback ◄── PeerEvent::Feedback
//!        │                     │
//!        ▼                     ▼ (commit)
//!   Swapchain::create ──► modifiers, buffer type
//!        │
//!        ▼
//!   acquire_next_image ◄── PeerEvent::BufferRelease
//!        │
//!        ▼
//!   queue_present ──► attach/damage/frame/commit
//!        ▲                     │
//!        └── PeerEvent::FrameDone (FIFO pacing)
//! ```
//!
//! **[`format`]**: DRM fourccs, `wl_shm` codes and the pixel formats each
//! one can back.
//!
//! **[`catalog`]**: ordered format entries with modifier lists, filtered by
//! what the renderer supports.
//!
//! **[`table`]**: the compositor's shared `(format, modifier)` table and
//! index resolution.
//!
//! **[`feedback`]**: the per-surface feedback state machine with atomic
//! commits.
//!
//! **[`discovery`]** and **[`display`]**: global binding policy and
//! connection setup.
//!
//! **[`surface`]**: lazy connection, swapchain ownership and event routing.
//!
//! **[`swapchain`]**: image creation, the acquire loop and FIFO-paced
//! presentation.
//!
//! **[`capabilities`]**: what a surface reports before a swapchain exists.
//!
//! **[`backend`]**: the transport and allocator contracts.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod backend;
pub mod capabilities;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod display;
pub mod error;
pub mod feedback;
pub mod format;
pub mod geometry;
pub mod surface;
pub mod swapchain;
pub mod table;
pub mod time;

#[cfg(test)]
mod testing;
