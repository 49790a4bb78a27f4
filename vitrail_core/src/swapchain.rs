// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Swapchains and the image lifecycle.
//!
//! A [`Swapchain`] owns a fixed ring of images, each paired with a
//! compositor buffer. An image is busy from the moment acquire hands it out
//! until the compositor releases its buffer:
//!
//! ```text
//!   free --acquire--> busy --present--> busy (attached) --release--> free
//! ```
//!
//! The acquire loop reads the connection itself. It dispatches what is
//! queued, looks for a free image, and otherwise declares an intent to read,
//! polls the connection until the deadline, reads, and tries again. Losing
//! the read race to another thread just means dispatching again.
//!
//! In FIFO mode every present requests a frame callback and the next
//! present waits for it, which throttles the application to the display.
//!
//! Swapchains borrow their [`Surface`] for each operation instead of
//! holding a reference; the caller must always pass the surface the
//! swapchain was created on.

use core::fmt;
use std::os::fd::AsFd;

use crate::backend::{
    AllocatedImage, Backend, BufferKey, DmabufBufferDesc, HostMemory, ImageAllocator, ImageKind,
    ImageMemory, ImageParams, Platform, PollOutcome, ShmBufferDesc, SwapchainId,
};
use crate::error::{AllocError, TransportError, WsiError};
use crate::format::{Modifier, PixelFormat};
use crate::geometry::{Extent, RectLayer};
use crate::surface::{Surface, SurfaceEvent};
use crate::time::{Deadline, Duration};

type BackendOf<P> = <P as Platform>::Backend;
type BufferOf<P> = <BackendOf<P> as Backend>::Buffer;
type RegionOf<P> = <BackendOf<P> as Backend>::HostRegion;
type FrameOf<P> = <BackendOf<P> as Backend>::FrameCallback;

/// How images are shared with the compositor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferType {
    /// GPU images exported as dma-bufs.
    Native,
    /// CPU images rendered straight into shared memory.
    GpuShm,
    /// CPU images copied into shared memory on present.
    ShmMemcpy,
}

impl BufferType {
    /// Picks the buffer path for a device.
    #[must_use]
    pub const fn select(software: bool, has_import_memory_host: bool, no_shm: bool) -> Self {
        if !software {
            Self::Native
        } else if has_import_memory_host && !no_shm {
            Self::GpuShm
        } else {
            Self::ShmMemcpy
        }
    }

    const fn uses_shm(self) -> bool {
        matches!(self, Self::GpuShm | Self::ShmMemcpy)
    }
}

/// How presents are paced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PresentMode {
    /// Replace whatever is queued. No pacing.
    Mailbox,
    /// One frame per display refresh, paced by frame callbacks.
    Fifo,
}

/// How the compositor should treat the alpha channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompositeAlpha {
    /// Alpha is ignored.
    Opaque,
    /// Color is premultiplied by alpha.
    PreMultiplied,
}

/// Parameters for [`Swapchain::create`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainCreateInfo {
    /// Number of images. Fixed for the life of the swapchain.
    pub min_image_count: u32,
    /// Pixel format of every image.
    pub format: PixelFormat,
    /// Image size.
    pub extent: Extent,
    /// Alpha treatment.
    pub composite_alpha: CompositeAlpha,
    /// Pacing.
    pub present_mode: PresentMode,
}

/// A successfully acquired image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Acquired {
    /// Index of the image.
    pub index: u32,
    /// The compositor prefers different allocation parameters; the
    /// swapchain should be recreated.
    pub suboptimal: bool,
}

struct Image<P: Platform, A: ImageAllocator> {
    backing: A::Image,
    memory: ImageMemory,
    buffer: BufferOf<P>,
    host: Option<RegionOf<P>>,
    busy: bool,
}

/// A ring of presentable images bound to one surface.
pub struct Swapchain<P: Platform, A: ImageAllocator> {
    id: SwapchainId,
    retired: bool,
    extent: Extent,
    format: PixelFormat,
    buffer_type: BufferType,
    wire_format: u32,
    modifiers: Vec<Modifier>,
    present_mode: PresentMode,
    fifo_ready: bool,
    frame: Option<FrameOf<P>>,
    suboptimal: bool,
    images: Vec<Image<P, A>>,
    allocator: A,
}

impl<P: Platform, A: ImageAllocator> Swapchain<P, A> {
    /// Creates a swapchain on `surface`.
    ///
    /// If `old` is given it loses the surface, even if creation then fails.
    /// The surface connection is opened on first use. Images are created
    /// with `allocator`, which the swapchain keeps until destroyed.
    pub fn create(
        surface: &mut Surface<P>,
        info: &SwapchainCreateInfo,
        old: Option<&mut Self>,
        allocator: A,
    ) -> Result<Self, WsiError> {
        let replacing = old.map(|old| {
            old.retired = true;
            old.id
        });
        let id = surface.claim(replacing)?;

        let mut chain = Self {
            id,
            retired: false,
            extent: info.extent,
            format: info.format,
            buffer_type: BufferType::Native,
            wire_format: 0,
            modifiers: Vec::new(),
            present_mode: info.present_mode,
            fifo_ready: true,
            frame: None,
            suboptimal: false,
            images: Vec::new(),
            allocator,
        };

        if let Err(err) = chain.init(surface, info) {
            log::debug!("creating {id:?} failed: {err}");
            chain.free_images(surface);
            surface.disown(id);
            return Err(err);
        }
        surface.set_allocation(id, chain.format, &chain.modifiers);
        log::debug!(
            "created {id:?}: {} {:?} images, {:?}, {:?}, {} modifiers",
            chain.images.len(),
            chain.format,
            chain.buffer_type,
            chain.present_mode,
            chain.modifiers.len()
        );
        Ok(chain)
    }

    fn init(&mut self, surface: &mut Surface<P>, info: &SwapchainCreateInfo) -> Result<(), WsiError> {
        surface.init()?;

        let config = *surface.config();
        self.buffer_type = BufferType::select(
            config.software,
            config.has_import_memory_host,
            config.no_shm,
        );
        let alpha = info.composite_alpha == CompositeAlpha::PreMultiplied;

        if self.buffer_type == BufferType::Native {
            self.wire_format = info.format.drm_format(alpha);
            if config.supports_modifiers {
                self.modifiers = select_modifiers(surface, info.format);
            }
        } else {
            self.wire_format = info.format.shm_format(alpha);
        }

        self.images
            .try_reserve_exact(info.min_image_count as usize)
            .map_err(|_| WsiError::OutOfHostMemory)?;
        for index in 0..info.min_image_count {
            let image = self.create_image(surface, index)?;
            self.images.push(image);
        }
        Ok(())
    }

    fn create_image(&mut self, surface: &mut Surface<P>, index: u32) -> Result<Image<P, A>, WsiError> {
        let kind = if self.buffer_type == BufferType::Native {
            ImageKind::Native {
                modifiers: self.modifiers.clone(),
            }
        } else {
            ImageKind::Cpu
        };
        let params = ImageParams {
            extent: self.extent,
            format: self.format,
            kind,
        };
        let AllocatedImage { image, memory } = self.allocator.create_image(&params)?;

        match self.share_image(surface, index, image, memory) {
            Ok(image) => Ok(image),
            Err((backing, err)) => {
                self.allocator.destroy_image(backing);
                Err(err)
            }
        }
    }

    #[expect(
        clippy::type_complexity,
        reason = "failure hands the unshared image back for destruction"
    )]
    fn share_image(
        &mut self,
        surface: &mut Surface<P>,
        index: u32,
        mut backing: A::Image,
        memory: ImageMemory,
    ) -> Result<Image<P, A>, (A::Image, WsiError)> {
        let key = BufferKey {
            chain: self.id,
            image: index,
        };
        let backend = match surface.backend_mut() {
            Ok(backend) => backend,
            Err(err) => return Err((backing, err)),
        };

        let (buffer, host) = match (&memory, self.buffer_type) {
            (ImageMemory::Cpu { row_pitch }, BufferType::GpuShm | BufferType::ShmMemcpy) => {
                let size = *row_pitch as usize * self.extent.height as usize;
                let mut region = match backend.create_host_region(size) {
                    Ok(region) => region,
                    Err(err) => return Err((backing, err)),
                };
                if self.buffer_type == BufferType::GpuShm {
                    if let Err(err) = self
                        .allocator
                        .import_host_memory(&mut backing, region.as_bytes_mut())
                    {
                        return Err((backing, err.into()));
                    }
                }
                let desc = ShmBufferDesc {
                    extent: self.extent,
                    stride: *row_pitch,
                    format: self.wire_format,
                };
                match backend.create_shm_buffer(&region, &desc, key) {
                    Ok(buffer) => (buffer, Some(region)),
                    Err(err) => return Err((backing, buffer_failed(err))),
                }
            }
            (
                ImageMemory::DmaBuf {
                    fd,
                    planes,
                    modifier,
                },
                BufferType::Native,
            ) => {
                let desc = DmabufBufferDesc {
                    fd: fd.as_fd(),
                    planes,
                    modifier: *modifier,
                    extent: self.extent,
                    format: self.wire_format,
                };
                match backend.create_dmabuf_buffer(&desc, key) {
                    Ok(buffer) => (buffer, None),
                    Err(err) => return Err((backing, buffer_failed(err))),
                }
            }
            _ => {
                return Err((
                    backing,
                    AllocError::Unsupported("image memory does not match the buffer type").into(),
                ));
            }
        };

        Ok(Image {
            backing,
            memory,
            buffer,
            host,
            busy: false,
        })
    }

    /// Identity of this swapchain on its surface.
    #[must_use]
    pub fn id(&self) -> SwapchainId {
        self.id
    }

    /// Number of images.
    #[must_use]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// How images are shared.
    #[must_use]
    pub fn buffer_type(&self) -> BufferType {
        self.buffer_type
    }

    /// Pacing mode.
    #[must_use]
    pub fn present_mode(&self) -> PresentMode {
        self.present_mode
    }

    /// DRM fourcc (native) or `wl_shm` code buffers are created with.
    #[must_use]
    pub fn wire_format(&self) -> u32 {
        self.wire_format
    }

    /// Modifiers offered to the allocator.
    #[must_use]
    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    /// Returns `true` once compositor feedback disagreed with the
    /// allocation parameters. Never cleared.
    #[must_use]
    pub fn is_suboptimal(&self) -> bool {
        self.suboptimal
    }

    /// Returns `true` while no frame callback is outstanding.
    #[must_use]
    pub fn fifo_ready(&self) -> bool {
        self.fifo_ready
    }

    /// Returns `true` if image `index` is held by the application or the
    /// compositor.
    #[must_use]
    pub fn is_busy(&self, index: u32) -> bool {
        self.images
            .get(index as usize)
            .is_some_and(|image| image.busy)
    }

    /// Renderer-side handle of image `index`.
    #[must_use]
    pub fn image(&self, index: u32) -> Option<&A::Image> {
        self.images.get(index as usize).map(|image| &image.backing)
    }

    /// The image allocator.
    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Returns `true` once another swapchain took over the surface.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    fn check_owner(&self, surface: &Surface<P>) -> Result<(), WsiError> {
        if self.retired || surface.owner() != Some(self.id) {
            return Err(WsiError::OutOfDate);
        }
        Ok(())
    }

    /// Acquires a free image, waiting up to `timeout`.
    ///
    /// Returns [`WsiError::NotReady`] if every image is still busy when the
    /// deadline passes, and [`WsiError::OutOfDate`] on any connection
    /// failure. Read races and interrupted waits are retried internally.
    pub fn acquire_next_image(
        &mut self,
        surface: &mut Surface<P>,
        timeout: Duration,
    ) -> Result<Acquired, WsiError> {
        self.check_owner(surface)?;
        let deadline = Deadline::after(surface.backend_mut()?.now(), timeout);

        loop {
            surface.dispatch_pending().map_err(WsiError::out_of_date)?;
            self.apply_events(surface);

            if let Some(index) = self.images.iter().position(|image| !image.busy) {
                self.images[index].busy = true;
                log::trace!("{:?} acquired image {index}", self.id);
                return Ok(Acquired {
                    index: index as u32,
                    suboptimal: self.suboptimal,
                });
            }

            let backend = surface.backend_mut()?;
            let now = backend.now();
            if deadline.has_passed(now) {
                log::trace!("{:?} acquire timed out", self.id);
                return Err(WsiError::NotReady);
            }

            let Some(guard) = backend.prepare_read().map_err(WsiError::out_of_date)? else {
                // Events are queued, possibly read by another thread.
                continue;
            };
            match backend
                .poll_readable(&guard, deadline.remaining(now))
                .map_err(WsiError::out_of_date)?
            {
                PollOutcome::Ready => backend.read_events(guard).map_err(WsiError::out_of_date)?,
                PollOutcome::TimedOut | PollOutcome::Interrupted => drop(guard),
            }
        }
    }

    /// Presents image `index`.
    ///
    /// `damage` limits the update to the given rectangles when the surface
    /// supports buffer-space damage; otherwise the whole surface is
    /// damaged. In FIFO mode this first waits, without timeout, for the
    /// previous frame callback.
    pub fn queue_present(
        &mut self,
        surface: &mut Surface<P>,
        index: u32,
        damage: Option<&[RectLayer]>,
    ) -> Result<(), WsiError> {
        self.check_owner(surface)?;
        let slot = index as usize;
        if slot >= self.images.len() {
            return Err(WsiError::InvalidImageIndex(index));
        }

        if self.buffer_type == BufferType::ShmMemcpy {
            self.copy_to_host(slot)?;
        }

        if self.present_mode == PresentMode::Fifo {
            while !self.fifo_ready {
                surface.blocking_dispatch().map_err(WsiError::out_of_date)?;
                self.apply_events(surface);
            }
        }

        let backend = surface.backend_mut()?;
        backend.attach(&self.images[slot].buffer);

        match damage {
            Some(rects) if !rects.is_empty() && backend.surface_version() >= 4 => {
                for rect in rects {
                    debug_assert_eq!(rect.layer, 0, "surfaces have a single layer");
                    let (width, height) = rect.protocol_size();
                    backend.damage_buffer(rect.x, rect.y, width, height);
                }
            }
            _ => backend.damage(0, 0, i32::MAX, i32::MAX),
        }

        if self.present_mode == PresentMode::Fifo {
            self.frame = Some(backend.request_frame(self.id));
            self.fifo_ready = false;
        }

        self.images[slot].busy = true;
        backend.commit();
        if let Err(err) = backend.flush() {
            log::warn!("flush after commit failed: {err}");
        }
        log::trace!("{:?} presented image {index}", self.id);
        Ok(())
    }

    fn copy_to_host(&mut self, slot: usize) -> Result<(), WsiError> {
        let image = &mut self.images[slot];
        let ImageMemory::Cpu { row_pitch } = image.memory else {
            return Err(AllocError::NotHostVisible.into());
        };
        let len = row_pitch as usize * self.extent.height as usize;
        let src = self
            .allocator
            .cpu_map(&image.backing)
            .and_then(|bytes| bytes.get(..len))
            .ok_or(AllocError::NotHostVisible)?;
        let dst = image
            .host
            .as_mut()
            .and_then(|region| region.as_bytes_mut().get_mut(..len))
            .ok_or(AllocError::NotHostVisible)?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn apply_events(&mut self, surface: &mut Surface<P>) {
        for event in surface.take_events() {
            match event {
                SurfaceEvent::BufferRelease(key) if key.chain == self.id => {
                    if let Some(image) = self.images.get_mut(key.image as usize) {
                        image.busy = false;
                    }
                }
                SurfaceEvent::FrameDone(chain) if chain == self.id => {
                    self.frame = None;
                    self.fifo_ready = true;
                }
                SurfaceEvent::FeedbackChanged(chain) if chain == self.id => {
                    if !self.suboptimal {
                        log::debug!(
                            "{:?} is suboptimal: compositor prefers other modifiers for {:?}",
                            self.id,
                            self.format
                        );
                    }
                    self.suboptimal = true;
                }
                other => log::trace!("{:?} dropping {other:?}", self.id),
            }
        }
    }

    /// Destroys every image, then releases the surface if still owned.
    ///
    /// `surface` must be the surface the swapchain was created on, even if
    /// the swapchain has been retired.
    pub fn destroy(mut self, surface: &mut Surface<P>) {
        self.free_images(surface);
        self.frame = None;
        surface.disown(self.id);
        log::debug!("destroyed {:?}", self.id);
    }

    fn free_images(&mut self, surface: &mut Surface<P>) {
        let images = core::mem::take(&mut self.images);
        let mut backend = surface.backend_mut().ok();
        for image in images {
            if let Some(backend) = backend.as_deref_mut() {
                backend.destroy_buffer(image.buffer);
            }
            self.allocator.destroy_image(image.backing);
            // Host region and descriptors are released on drop.
            drop(image.host);
            drop(image.memory);
        }
    }
}

impl<P: Platform, A: ImageAllocator> fmt::Debug for Swapchain<P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Swapchain")
            .field("id", &self.id)
            .field("retired", &self.retired)
            .field("extent", &self.extent)
            .field("format", &self.format)
            .field("buffer_type", &self.buffer_type)
            .field("present_mode", &self.present_mode)
            .field("fifo_ready", &self.fifo_ready)
            .field("suboptimal", &self.suboptimal)
            .field("images", &self.images.len())
            .finish_non_exhaustive()
    }
}

fn buffer_failed(err: TransportError) -> WsiError {
    log::warn!("compositor buffer creation failed: {err}");
    WsiError::OutOfHostMemory
}

/// Modifiers for a native swapchain: the surface feedback's preferred
/// tranche first, the display-wide catalog otherwise.
fn select_modifiers<P: Platform>(surface: &Surface<P>, format: PixelFormat) -> Vec<Modifier> {
    let Some(display) = surface.display() else {
        return Vec::new();
    };
    if display.globals().dmabuf.is_none() {
        return Vec::new();
    }
    surface
        .feedback()
        .and_then(|feedback| feedback.current().pick_format(format))
        .or_else(|| display.formats().find(format))
        .map(|entry| entry.modifiers().to_vec())
        .unwrap_or_default()
}
