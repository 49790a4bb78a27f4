// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scripted transport and fake allocator for unit tests.
//!
//! [`Script`] is shared between a test and every [`ScriptedBackend`] it
//! spawns. Events are released either at a given roundtrip or at a time
//! on a virtual clock that only moves when the engine waits, so timing
//! assertions are exact.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::rc::Rc;

use crate::backend::{
    AllocatedImage, Backend, BufferKey, DmabufBufferDesc, DmabufPlane, HostMemory,
    ImageAllocator, ImageKind, ImageMemory, ImageParams, PeerEvent, Platform, PollOutcome,
    ShmBufferDesc, SwapchainId,
};
use crate::discovery::{Global, Globals, WL_SHM, ZWP_LINUX_DMABUF_V1};
use crate::error::{AllocError, TransportError, WsiError};
use crate::format::Modifier;
use crate::time::{Duration, HostTime};

/// Everything a script controls or records.
#[derive(Debug, Default)]
pub(crate) struct ScriptState {
    advertised: Vec<(&'static str, u32)>,
    on_roundtrip: HashMap<usize, Vec<PeerEvent>>,
    scheduled: Vec<(HostTime, PeerEvent)>,
    clock: HostTime,
    surface_version: u32,
    io_failed: bool,
    fail_buffers: bool,
    interrupted_polls: usize,
    failing_roundtrip: Option<usize>,

    pub(crate) connects: usize,
    pub(crate) roundtrips: usize,
    pub(crate) default_feedback_requested: bool,
    pub(crate) discovery_finished: bool,
    pub(crate) contended_reads: usize,
    pub(crate) attaches: usize,
    pub(crate) attached_images: Vec<u32>,
    pub(crate) commits: usize,
    pub(crate) flushes: usize,
    pub(crate) frames_requested: usize,
    pub(crate) buffer_damage: Vec<(i32, i32, i32, i32)>,
    pub(crate) surface_damage: Vec<(i32, i32, i32, i32)>,
    pub(crate) shm_buffers: usize,
    pub(crate) dmabuf_buffers: usize,
    pub(crate) live_buffers: usize,
}

impl ScriptState {
    fn has_due(&self) -> bool {
        self.scheduled.first().is_some_and(|(at, _)| *at <= self.clock)
    }

    fn drain_due(&mut self, events: &mut Vec<PeerEvent>) -> usize {
        let due = self.scheduled.partition_point(|(at, _)| *at <= self.clock);
        events.extend(self.scheduled.drain(..due).map(|(_, event)| event));
        due
    }

    fn next_event_time(&self) -> Option<HostTime> {
        self.scheduled.first().map(|(at, _)| *at)
    }
}

/// Handle to a shared script.
#[derive(Clone, Debug)]
pub(crate) struct Script(Rc<RefCell<ScriptState>>);

impl Script {
    pub(crate) fn new() -> Self {
        Self(Rc::new(RefCell::new(ScriptState {
            surface_version: 4,
            ..ScriptState::default()
        })))
    }

    fn state_mut(&self) -> RefMut<'_, ScriptState> {
        self.0.borrow_mut()
    }

    pub(crate) fn state(&self) -> Ref<'_, ScriptState> {
        self.0.borrow()
    }

    /// Advertises a global to every later connection.
    pub(crate) fn advertise(&self, global: Global, version: u32) {
        let interface = match global {
            Global::Shm => WL_SHM,
            Global::LinuxDmabuf => ZWP_LINUX_DMABUF_V1,
        };
        self.state_mut().advertised.push((interface, version));
    }

    /// Delivers `events` during roundtrip number `index`, counted from 0
    /// across all connections.
    pub(crate) fn on_roundtrip(&self, index: usize, events: impl IntoIterator<Item = PeerEvent>) {
        self.state_mut()
            .on_roundtrip
            .entry(index)
            .or_default()
            .extend(events);
    }

    /// Makes `event` readable `delay` from now.
    pub(crate) fn deliver_after(&self, delay: Duration, event: PeerEvent) {
        let mut state = self.state_mut();
        let at = state.clock + delay;
        let slot = state.scheduled.partition_point(|(time, _)| *time <= at);
        state.scheduled.insert(slot, (at, event));
    }

    pub(crate) fn now(&self) -> HostTime {
        self.state().clock
    }

    /// How far a timed-out wait may overshoot its deadline.
    pub(crate) fn poll_slack(&self) -> Duration {
        Duration::from_nanos(1)
    }

    /// Another reader wins the next `count` read races.
    pub(crate) fn contend_reads(&self, count: usize) {
        self.state_mut().contended_reads = count;
    }

    /// The next `count` waits are woken by a signal.
    pub(crate) fn interrupt_polls(&self, count: usize) {
        self.state_mut().interrupted_polls = count;
    }

    /// The connection hangs up: waits report readable and reads fail.
    pub(crate) fn fail_io(&self) {
        self.state_mut().io_failed = true;
    }

    /// Roundtrip number `index` fails with a hang-up.
    pub(crate) fn fail_roundtrip(&self, index: usize) {
        self.state_mut().failing_roundtrip = Some(index);
    }

    /// Buffer creation requests fail from now on.
    pub(crate) fn fail_buffer_creation(&self) {
        self.state_mut().fail_buffers = true;
    }

    pub(crate) fn set_surface_version(&self, version: u32) {
        self.state_mut().surface_version = version;
    }
}

/// Opens [`ScriptedBackend`]s.
#[derive(Debug)]
pub(crate) struct ScriptedPlatform {
    script: Script,
}

impl ScriptedPlatform {
    pub(crate) fn new(script: &Script) -> Self {
        Self {
            script: script.clone(),
        }
    }
}

impl Platform for ScriptedPlatform {
    type Backend = ScriptedBackend;

    fn connect(&self, software: bool) -> Result<ScriptedBackend, WsiError> {
        self.script.state_mut().connects += 1;
        Ok(ScriptedBackend {
            script: self.script.clone(),
            software,
            globals: Globals::default(),
            bound: false,
        })
    }
}

#[derive(Debug)]
pub(crate) struct ScriptedBackend {
    script: Script,
    software: bool,
    globals: Globals,
    bound: bool,
}

#[derive(Debug)]
pub(crate) struct ScriptedBuffer(BufferKey);

#[derive(Debug)]
pub(crate) struct ScriptedFrame;

#[derive(Debug)]
pub(crate) struct ScriptedReadGuard;

#[derive(Debug)]
pub(crate) struct ScriptedRegion {
    pub(crate) bytes: Vec<u8>,
}

impl HostMemory for ScriptedRegion {
    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

fn hang_up() -> TransportError {
    TransportError::Io(io::Error::from(io::ErrorKind::BrokenPipe))
}

impl Backend for ScriptedBackend {
    type Buffer = ScriptedBuffer;
    type FrameCallback = ScriptedFrame;
    type HostRegion = ScriptedRegion;
    type ReadGuard = ScriptedReadGuard;

    fn now(&self) -> HostTime {
        self.script.now()
    }

    fn globals(&self) -> Globals {
        self.globals
    }

    fn roundtrip(&mut self, events: &mut Vec<PeerEvent>) -> Result<(), TransportError> {
        let mut state = self.script.state_mut();
        if !self.bound {
            self.bound = true;
            for &(interface, version) in &state.advertised {
                if let Some((global, version)) =
                    Global::bind_version(interface, version, self.software)
                {
                    self.globals.record(global, version);
                }
            }
        }
        let index = state.roundtrips;
        state.roundtrips += 1;
        if state.failing_roundtrip == Some(index) {
            return Err(hang_up());
        }
        events.extend(state.on_roundtrip.remove(&index).unwrap_or_default());
        state.drain_due(events);
        Ok(())
    }

    fn subscribe_default_feedback(&mut self) -> Result<(), TransportError> {
        self.script.state_mut().default_feedback_requested = true;
        Ok(())
    }

    fn finish_discovery(&mut self) {
        self.script.state_mut().discovery_finished = true;
    }

    fn subscribe_surface_feedback(&mut self) -> Result<bool, TransportError> {
        Ok(self.globals.supports_feedback())
    }

    fn dispatch_pending(&mut self, events: &mut Vec<PeerEvent>) -> Result<usize, TransportError> {
        Ok(self.script.state_mut().drain_due(events))
    }

    fn blocking_dispatch(&mut self, events: &mut Vec<PeerEvent>) -> Result<usize, TransportError> {
        let mut state = self.script.state_mut();
        if state.io_failed {
            return Err(hang_up());
        }
        if !state.has_due() {
            let next = state.next_event_time().ok_or(TransportError::Disconnected)?;
            state.clock = state.clock.max(next);
        }
        Ok(state.drain_due(events))
    }

    fn prepare_read(&mut self) -> Result<Option<ScriptedReadGuard>, TransportError> {
        let mut state = self.script.state_mut();
        if state.contended_reads > 0 {
            state.contended_reads -= 1;
            return Ok(None);
        }
        Ok((!state.has_due()).then_some(ScriptedReadGuard))
    }

    fn poll_readable(
        &mut self,
        _guard: &ScriptedReadGuard,
        timeout: Duration,
    ) -> Result<PollOutcome, TransportError> {
        let mut state = self.script.state_mut();
        if state.io_failed {
            return Ok(PollOutcome::Ready);
        }
        if state.interrupted_polls > 0 {
            state.interrupted_polls -= 1;
            return Ok(PollOutcome::Interrupted);
        }

        let next = state.next_event_time();
        if timeout.is_infinite() {
            let next = next.ok_or(TransportError::Disconnected)?;
            state.clock = state.clock.max(next);
            return Ok(PollOutcome::Ready);
        }
        let limit = state.clock + timeout;
        match next {
            Some(next) if next <= limit => {
                state.clock = state.clock.max(next);
                Ok(PollOutcome::Ready)
            }
            _ => {
                state.clock = state.clock + timeout.max(Duration::from_nanos(1));
                Ok(PollOutcome::TimedOut)
            }
        }
    }

    fn read_events(&mut self, _guard: ScriptedReadGuard) -> Result<(), TransportError> {
        if self.script.state().io_failed {
            return Err(hang_up());
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.script.state_mut().flushes += 1;
        Ok(())
    }

    fn surface_version(&self) -> u32 {
        self.script.state().surface_version
    }

    fn attach(&mut self, buffer: &ScriptedBuffer) {
        let mut state = self.script.state_mut();
        state.attaches += 1;
        state.attached_images.push(buffer.0.image);
    }

    fn damage_buffer(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.script
            .state_mut()
            .buffer_damage
            .push((x, y, width, height));
    }

    fn damage(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.script
            .state_mut()
            .surface_damage
            .push((x, y, width, height));
    }

    fn request_frame(&mut self, _chain: SwapchainId) -> ScriptedFrame {
        self.script.state_mut().frames_requested += 1;
        ScriptedFrame
    }

    fn commit(&mut self) {
        self.script.state_mut().commits += 1;
    }

    fn create_host_region(&mut self, size: usize) -> Result<ScriptedRegion, WsiError> {
        Ok(ScriptedRegion {
            bytes: vec![0; size],
        })
    }

    fn create_shm_buffer(
        &mut self,
        region: &ScriptedRegion,
        desc: &ShmBufferDesc,
        key: BufferKey,
    ) -> Result<ScriptedBuffer, TransportError> {
        let mut state = self.script.state_mut();
        let needed = desc.stride as usize * desc.extent.height as usize;
        if state.fail_buffers || region.bytes.len() < needed {
            return Err(TransportError::Protocol {
                interface: "wl_shm_pool".into(),
                code: 1,
                message: "invalid buffer".into(),
            });
        }
        state.shm_buffers += 1;
        state.live_buffers += 1;
        Ok(ScriptedBuffer(key))
    }

    fn create_dmabuf_buffer(
        &mut self,
        desc: &DmabufBufferDesc<'_>,
        key: BufferKey,
    ) -> Result<ScriptedBuffer, TransportError> {
        let mut state = self.script.state_mut();
        if state.fail_buffers || desc.planes.is_empty() {
            return Err(TransportError::Protocol {
                interface: "zwp_linux_buffer_params_v1".into(),
                code: 7,
                message: "invalid wl_buffer".into(),
            });
        }
        state.dmabuf_buffers += 1;
        state.live_buffers += 1;
        Ok(ScriptedBuffer(key))
    }

    fn destroy_buffer(&mut self, _buffer: ScriptedBuffer) {
        self.script.state_mut().live_buffers -= 1;
    }
}

/// Handle to a [`FakeAllocator`] image.
#[derive(Debug)]
pub(crate) struct FakeImage {
    slot: usize,
}

/// Allocates images as plain byte vectors.
#[derive(Debug, Default)]
pub(crate) struct FakeAllocator {
    pub(crate) requests: Vec<ImageParams>,
    /// Fail every allocation after this many succeeded.
    pub(crate) fail_after: Option<usize>,
    pub(crate) imports: usize,
    pub(crate) pixels: Vec<Vec<u8>>,
}

impl FakeAllocator {
    /// Pretends the renderer filled image `slot` with `byte`.
    pub(crate) fn fill(&mut self, slot: u32, byte: u8) {
        self.pixels[slot as usize].fill(byte);
    }
}

impl ImageAllocator for FakeAllocator {
    type Image = FakeImage;

    fn create_image(
        &mut self,
        params: &ImageParams,
    ) -> Result<AllocatedImage<FakeImage>, AllocError> {
        if self.fail_after.is_some_and(|limit| self.requests.len() >= limit) {
            return Err(AllocError::OutOfMemory);
        }
        let row_pitch = params.extent.width * params.format.bytes_per_pixel();
        let memory = match &params.kind {
            ImageKind::Native { modifiers } => {
                self.pixels.push(Vec::new());
                ImageMemory::DmaBuf {
                    fd: File::open("/dev/null")?.into(),
                    planes: vec![DmabufPlane {
                        offset: 0,
                        stride: row_pitch,
                    }],
                    modifier: modifiers.first().copied().unwrap_or(Modifier::INVALID),
                }
            }
            ImageKind::Cpu => {
                self.pixels
                    .push(vec![0; row_pitch as usize * params.extent.height as usize]);
                ImageMemory::Cpu { row_pitch }
            }
        };
        self.requests.push(params.clone());
        Ok(AllocatedImage {
            image: FakeImage {
                slot: self.pixels.len() - 1,
            },
            memory,
        })
    }

    fn import_host_memory(
        &mut self,
        _image: &mut FakeImage,
        _memory: &mut [u8],
    ) -> Result<(), AllocError> {
        self.imports += 1;
        Ok(())
    }

    fn cpu_map<'a>(&'a self, image: &'a FakeImage) -> Option<&'a [u8]> {
        self.pixels
            .get(image.slot)
            .filter(|pixels| !pixels.is_empty())
            .map(Vec::as_slice)
    }

    fn destroy_image(&mut self, image: FakeImage) {
        if let Some(pixels) = self.pixels.get_mut(image.slot) {
            *pixels = Vec::new();
        }
    }
}
