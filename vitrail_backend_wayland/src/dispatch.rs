// Copyright 2026 the Vitrail Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Protocol event handlers.
//!
//! Handlers decode events into [`PeerEvent`]s and queue them on
//! [`QueueState`]. Only the registry handler acts on its own: it binds the
//! globals the binding policy selects.

use wayland_client::{
    Connection, Dispatch, QueueHandle, WEnum,
    protocol::{
        wl_buffer::{self, WlBuffer},
        wl_callback::{self, WlCallback},
        wl_registry::{self, WlRegistry},
        wl_shm::{self, WlShm},
        wl_shm_pool::WlShmPool,
    },
};
use wayland_protocols::wp::linux_dmabuf::zv1::client::{
    zwp_linux_buffer_params_v1::ZwpLinuxBufferParamsV1,
    zwp_linux_dmabuf_feedback_v1::{self, ZwpLinuxDmabufFeedbackV1},
    zwp_linux_dmabuf_v1::{self, ZwpLinuxDmabufV1},
};

use vitrail_core::backend::{BufferKey, PeerEvent, SwapchainId};
use vitrail_core::discovery::{DiscoveryEvent, Global};
use vitrail_core::feedback::{DeviceId, FeedbackEvent, TrancheFlags};
use vitrail_core::format::Modifier;
use vitrail_core::table::{FormatTable, indices_from_ne_bytes};

use crate::event_loop::QueueState;
use crate::shm::MappedTable;

/// Which feedback object an event came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FeedbackTarget {
    /// Connection-wide default feedback, sampled during discovery.
    Default,
    /// Live feedback for the presented surface.
    Surface,
}

impl Dispatch<WlRegistry, ()> for QueueState {
    fn event(
        state: &mut Self,
        registry: &WlRegistry,
        event: wl_registry::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let wl_registry::Event::Global {
            name,
            interface,
            version,
        } = event
        else {
            return;
        };
        let Some((global, version)) = Global::bind_version(&interface, version, state.software)
        else {
            return;
        };
        match global {
            Global::Shm => {
                state.shm = Some(registry.bind::<WlShm, _, _>(name, version, qh, ()));
            }
            Global::LinuxDmabuf => {
                state.dmabuf = Some(registry.bind::<ZwpLinuxDmabufV1, _, _>(name, version, qh, ()));
            }
        }
        state.globals.record(global, version);
        log::debug!("bound {interface} v{version}");
    }
}

impl Dispatch<WlShm, ()> for QueueState {
    fn event(
        state: &mut Self,
        _shm: &WlShm,
        event: wl_shm::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_shm::Event::Format { format } = event {
            let code = match format {
                WEnum::Value(format) => u32::from(format),
                WEnum::Unknown(code) => code,
            };
            state
                .events
                .push(PeerEvent::Discovery(DiscoveryEvent::ShmFormat(code)));
        }
    }
}

impl Dispatch<ZwpLinuxDmabufV1, ()> for QueueState {
    fn event(
        state: &mut Self,
        _dmabuf: &ZwpLinuxDmabufV1,
        event: zwp_linux_dmabuf_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let event = match event {
            zwp_linux_dmabuf_v1::Event::Format { format } => DiscoveryEvent::DmabufFormat(format),
            zwp_linux_dmabuf_v1::Event::Modifier {
                format,
                modifier_hi,
                modifier_lo,
            } => DiscoveryEvent::DmabufModifier {
                format,
                modifier: Modifier::from_hi_lo(modifier_hi, modifier_lo),
            },
            _ => return,
        };
        state.events.push(PeerEvent::Discovery(event));
    }
}

impl Dispatch<ZwpLinuxDmabufFeedbackV1, FeedbackTarget> for QueueState {
    fn event(
        state: &mut Self,
        _feedback: &ZwpLinuxDmabufFeedbackV1,
        event: zwp_linux_dmabuf_feedback_v1::Event,
        target: &FeedbackTarget,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let Some(event) = decode_feedback(event) else {
            return;
        };
        state.events.push(match target {
            FeedbackTarget::Default => PeerEvent::Discovery(DiscoveryEvent::DefaultFeedback(event)),
            FeedbackTarget::Surface => PeerEvent::Feedback(event),
        });
    }
}

fn decode_feedback(event: zwp_linux_dmabuf_feedback_v1::Event) -> Option<FeedbackEvent> {
    use zwp_linux_dmabuf_feedback_v1::Event;

    Some(match event {
        Event::Done => FeedbackEvent::Done,
        Event::FormatTable { fd, size } => {
            FeedbackEvent::FormatTable(FormatTable::install(MappedTable::map(fd, size)))
        }
        Event::MainDevice { device } => FeedbackEvent::MainDevice(device_id(&device)),
        Event::TrancheDone => FeedbackEvent::TrancheDone,
        Event::TrancheTargetDevice { device } => {
            FeedbackEvent::TrancheTargetDevice(device_id(&device))
        }
        Event::TrancheFormats { indices } => {
            FeedbackEvent::TrancheFormats(indices_from_ne_bytes(&indices))
        }
        Event::TrancheFlags { flags } => {
            let bits = match flags {
                WEnum::Value(flags) => flags.bits(),
                WEnum::Unknown(bits) => bits,
            };
            FeedbackEvent::TrancheFlags(TrancheFlags::from_bits_retain(bits))
        }
        _ => return None,
    })
}

fn device_id(bytes: &[u8]) -> DeviceId {
    DeviceId::from_ne_bytes(bytes).unwrap_or_else(|| {
        log::warn!("ignoring dev_t of {} bytes", bytes.len());
        DeviceId::UNKNOWN
    })
}

impl Dispatch<WlBuffer, BufferKey> for QueueState {
    fn event(
        state: &mut Self,
        _buffer: &WlBuffer,
        event: wl_buffer::Event,
        key: &BufferKey,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            state.events.push(PeerEvent::BufferRelease(*key));
        }
    }
}

impl Dispatch<WlCallback, SwapchainId> for QueueState {
    fn event(
        state: &mut Self,
        _callback: &WlCallback,
        event: wl_callback::Event,
        chain: &SwapchainId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { .. } = event {
            state.events.push(PeerEvent::FrameDone(*chain));
        }
    }
}

wayland_client::delegate_noop!(QueueState: WlShmPool);
// Buffers are created with create_immed, so created/failed never arrive.
wayland_client::delegate_noop!(QueueState: ignore ZwpLinuxBufferParamsV1);
