//! Single-producer/single-consumer handoff between the reader tasks and the
//! control task.
//!
//! Radio readers publish complete frames into per-channel slots, the IMU
//! reader publishes the latest yaw, the motor reader publishes bus-current
//! replies, and the trigger task latches manual inputs. The control task is the
//! only consumer; taking a value clears it. A newer frame replaces one the
//! control task has not read yet.

use actuator_core::TickReport;
use actuator_core::command::{FRAME_LEN, RawFrame, frame_from_bytes};
use actuator_core::hal::{RadioChannel, TriggerFlags};
use actuator_core::motion::MotionState;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use heapless::Vec;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

/// Latest-frame slot for one radio channel.
pub type FrameSlot<M> = Signal<M, RawFrame>;

/// Everything the reader tasks hand to the control task.
pub struct Handoff<M: RawMutex> {
    long_range: FrameSlot<M>,
    short_range: FrameSlot<M>,
    pub triggers: TriggerLatch,
    pub yaw: YawCell,
    pub bus_current: BusCurrentCell,
    low_power: AtomicBool,
    wake: Signal<M, ()>,
}

impl<M: RawMutex> Handoff<M> {
    pub const fn new() -> Self {
        Self {
            long_range: Signal::new(),
            short_range: Signal::new(),
            triggers: TriggerLatch::new(),
            yaw: YawCell::new(),
            bus_current: BusCurrentCell::new(),
            low_power: AtomicBool::new(false),
            wake: Signal::new(),
        }
    }

    fn slot(&self, channel: RadioChannel) -> &FrameSlot<M> {
        match channel {
            RadioChannel::LongRange => &self.long_range,
            RadioChannel::ShortRange => &self.short_range,
        }
    }

    /// Stores `frame` for the control task and wakes it if it is dozing.
    pub fn publish_frame(&self, channel: RadioChannel, frame: RawFrame) {
        self.slot(channel).signal(frame);
        self.wake.signal(());
    }

    pub fn take_frame(&self, channel: RadioChannel) -> Option<RawFrame> {
        self.slot(channel).try_take()
    }

    /// Latches a manual trigger or edge and wakes the control task.
    pub fn raise_trigger(&self, trigger: ManualTrigger) {
        self.triggers.raise(trigger);
        self.wake.signal(());
    }

    pub fn request_low_power(&self) {
        self.low_power.store(true, Ordering::Release);
    }

    /// Reads and clears the low-power request.
    pub fn take_low_power(&self) -> bool {
        self.low_power.swap(false, Ordering::AcqRel)
    }

    /// Decides whether the control task may doze after `report`. The request
    /// is consumed whenever no sequence is in flight, so a stale flag cannot
    /// put a later moving tick to sleep.
    pub fn take_doze(&self, report: &TickReport) -> bool {
        if report.sequence.is_some() {
            return false;
        }
        self.take_low_power() && report.motion == MotionState::Idle
    }

    /// Drops wake notifications that arrived before the caller started dozing.
    pub fn reset_wake(&self) {
        self.wake.reset();
    }

    /// Whether a frame or manual input is waiting for the control task.
    pub fn input_pending(&self) -> bool {
        self.long_range.signaled() || self.short_range.signaled() || self.triggers.pending()
    }

    /// Waits for the next frame or manual input.
    pub async fn wait_for_wake(&self) {
        self.wake.wait().await;
    }
}

impl<M: RawMutex> Default for Handoff<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Manual inputs reported by the trigger task.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ManualTrigger {
    /// Push sensor: request to open.
    Forward,
    /// Pull sensor: request to close.
    Reverse,
    /// Debounced edge on the manual input pin.
    Edge,
}

/// Latched manual triggers, cleared when read.
pub struct TriggerLatch {
    forward: AtomicBool,
    reverse: AtomicBool,
    edge: AtomicBool,
}

impl TriggerLatch {
    pub const fn new() -> Self {
        Self {
            forward: AtomicBool::new(false),
            reverse: AtomicBool::new(false),
            edge: AtomicBool::new(false),
        }
    }

    pub fn raise(&self, trigger: ManualTrigger) {
        let flag = match trigger {
            ManualTrigger::Forward => &self.forward,
            ManualTrigger::Reverse => &self.reverse,
            ManualTrigger::Edge => &self.edge,
        };
        flag.store(true, Ordering::Release);
    }

    pub fn take(&self) -> TriggerFlags {
        TriggerFlags {
            manual_forward: self.forward.swap(false, Ordering::AcqRel),
            manual_reverse: self.reverse.swap(false, Ordering::AcqRel),
        }
    }

    pub fn take_edge(&self) -> bool {
        self.edge.swap(false, Ordering::AcqRel)
    }

    pub fn pending(&self) -> bool {
        [&self.forward, &self.reverse, &self.edge]
            .iter()
            .any(|flag| flag.load(Ordering::Acquire))
    }
}

impl Default for TriggerLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Latest yaw reading, stored as raw `f32` bits.
pub struct YawCell {
    bits: AtomicU32,
}

impl YawCell {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }

    pub fn publish(&self, yaw: f32) {
        self.bits.store(yaw.to_bits(), Ordering::Release);
    }

    pub fn latest(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }
}

impl Default for YawCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Bus-current reply slot; a reading is handed out once.
pub struct BusCurrentCell {
    bits: AtomicU32,
    fresh: AtomicBool,
}

impl BusCurrentCell {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
            fresh: AtomicBool::new(false),
        }
    }

    pub fn publish(&self, amperes: f32) {
        self.bits.store(amperes.to_bits(), Ordering::Release);
        self.fresh.store(true, Ordering::Release);
    }

    pub fn take(&self) -> Option<f32> {
        self.fresh
            .swap(false, Ordering::AcqRel)
            .then(|| f32::from_bits(self.bits.load(Ordering::Acquire)))
    }
}

impl Default for BusCurrentCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects UART bytes into frames. A frame ends at CR or LF, when the
/// buffer fills, or when the reader reports an idle line via [`flush`].
///
/// [`flush`]: FrameAssembler::flush
pub struct FrameAssembler {
    buffer: Vec<u8, FRAME_LEN>,
}

impl FrameAssembler {
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn push(&mut self, byte: u8) -> Option<RawFrame> {
        if matches!(byte, b'\r' | b'\n') {
            return self.flush();
        }
        // Never full here: a full buffer is flushed right after the push.
        let _ = self.buffer.push(byte);
        if self.buffer.is_full() {
            return self.flush();
        }
        None
    }

    pub fn flush(&mut self) -> Option<RawFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        let frame = frame_from_bytes(&self.buffer);
        self.buffer.clear();
        Some(frame)
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
