//! Test doubles for the hardware collaborators - only compiled in test builds.

use core::cell::{Cell, RefCell};

use heapless::{Deque, Vec};

use crate::{
    bus::{ControlBus, Direction},
    clock::{CaptureTimer, PinInterrupts, PinMode},
    error::BusError,
    shadow::PAGE_SELECT,
    target::{TargetEvent, TargetPort, TargetReply},
    vector::{Vector, VectorControl},
};

/// Register-level model of one SRC4392 behind the control bus.
pub struct MockChip {
    page: u8,
    regs: [[u8; 128]; 4],
    fail: Option<BusError>,
    fail_writes: Option<BusError>,
    transfers: usize,
    writes: usize,
    page_selects: usize,
}

impl MockChip {
    pub fn new() -> Self {
        Self {
            page: 0,
            regs: [[0; 128]; 4],
            fail: None,
            fail_writes: None,
            transfers: 0,
            writes: 0,
            page_selects: 0,
        }
    }

    pub fn register(&self, page: u8, address: u8) -> u8 {
        self.regs[(page & 0x03) as usize][(address & 0x7F) as usize]
    }

    pub fn set_register(&mut self, page: u8, address: u8, value: u8) {
        self.regs[(page & 0x03) as usize][(address & 0x7F) as usize] = value;
    }

    /// Makes every following transfer fail with `err` until cleared.
    pub fn fail_with(&mut self, err: Option<BusError>) {
        self.fail = err;
    }

    /// Makes register writes fail with `err` until cleared; page selects and
    /// reads still go through.
    pub fn fail_writes_with(&mut self, err: Option<BusError>) {
        self.fail_writes = err;
    }

    /// Successful transfers so far.
    pub fn transfers(&self) -> usize {
        self.transfers
    }

    /// Successful write transfers, page selects included.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn page_selects(&self) -> usize {
        self.page_selects
    }
}

impl Default for MockChip {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlBus for MockChip {
    fn transfer(
        &mut self,
        direction: Direction,
        address: u8,
        buf: &mut [u8],
    ) -> Result<usize, BusError> {
        if let Some(err) = self.fail {
            return Err(err);
        }
        if let (Direction::Write, Some(err)) = (direction, self.fail_writes) {
            if address != PAGE_SELECT {
                return Err(err);
            }
        }
        self.transfers += 1;

        let page = (self.page & 0x03) as usize;
        let start = address as usize;
        match direction {
            Direction::Write if address == PAGE_SELECT => {
                self.writes += 1;
                self.page_selects += 1;
                self.page = buf[0];
            }
            Direction::Write => {
                self.writes += 1;
                for (i, value) in buf.iter().enumerate() {
                    self.regs[page][(start + i) & 0x7F] = *value;
                }
            }
            Direction::Read => {
                for (i, value) in buf.iter_mut().enumerate() {
                    *value = self.regs[page][(start + i) & 0x7F];
                }
            }
        }
        Ok(buf.len())
    }
}

/// Interrupt controller that records masks instead of touching hardware.
#[derive(Default)]
pub struct MockVectors {
    enabled: Cell<u64>,
    enable_calls: Cell<usize>,
    active: Cell<Option<Vector>>,
}

impl MockVectors {
    pub fn is_enabled(&self, vector: Vector) -> bool {
        self.enabled.get() & bit(vector) != 0
    }

    pub fn enable_calls(&self) -> usize {
        self.enable_calls.get()
    }

    /// Vector reported as being serviced.
    pub fn set_active(&self, vector: Option<Vector>) {
        self.active.set(vector);
    }
}

fn bit(vector: Vector) -> u64 {
    1u64.checked_shl(vector.number() as u32).unwrap_or(0)
}

impl VectorControl for MockVectors {
    fn enable(&self, vector: Vector) {
        self.enabled.set(self.enabled.get() | bit(vector));
        self.enable_calls.set(self.enable_calls.get() + 1);
    }

    fn disable(&self, vector: Vector) {
        self.enabled.set(self.enabled.get() & !bit(vector));
    }

    fn active(&self) -> Option<Vector> {
        self.active.get()
    }
}

/// Capture timer with settable counts.
#[derive(Default)]
pub struct MockTimer {
    count: Cell<u16>,
    captures: [Cell<u16>; 8],
}

impl MockTimer {
    pub fn set_count(&self, count: u16) {
        self.count.set(count);
    }

    pub fn set_capture(&self, channel: u8, value: u16) {
        if let Some(capture) = self.captures.get(channel as usize) {
            capture.set(value);
        }
    }
}

impl CaptureTimer for MockTimer {
    fn current_count(&self) -> u16 {
        self.count.get()
    }

    fn last_capture(&self, channel: u8) -> u16 {
        self.captures
            .get(channel as usize)
            .map_or(0, Cell::get)
    }
}

/// Pin interrupt controller recording the mode of each armed line.
#[derive(Default)]
pub struct MockPins {
    modes: [Cell<Option<PinMode>>; 8],
}

impl MockPins {
    pub fn mode(&self, line: u8) -> Option<PinMode> {
        self.modes.get(line as usize).and_then(Cell::get)
    }

    pub fn is_enabled(&self, line: u8) -> bool {
        self.mode(line).is_some()
    }
}

impl PinInterrupts for MockPins {
    fn enable(&self, line: u8, mode: PinMode) {
        if let Some(slot) = self.modes.get(line as usize) {
            slot.set(Some(mode));
        }
    }

    fn disable(&self, line: u8) {
        if let Some(slot) = self.modes.get(line as usize) {
            slot.set(None);
        }
    }
}

/// Bus target driver fed from a queue of scripted events.
#[derive(Default)]
pub struct MockPort {
    pending: RefCell<Deque<TargetEvent, 32>>,
    replies: RefCell<Vec<TargetReply, 32>>,
    notifications: Cell<bool>,
}

impl MockPort {
    pub fn push(&self, events: &[TargetEvent]) {
        let mut pending = self.pending.borrow_mut();
        for &event in events {
            pending.push_back(event).unwrap();
        }
    }

    /// Replies given so far, oldest first; clears the record.
    pub fn take_replies(&self) -> Vec<TargetReply, 32> {
        core::mem::take(&mut *self.replies.borrow_mut())
    }

    pub fn notifications(&self) -> bool {
        self.notifications.get()
    }
}

impl TargetPort for MockPort {
    fn service(&self, handler: &mut dyn FnMut(TargetEvent) -> TargetReply) {
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            let reply = handler(event);
            self.replies.borrow_mut().push(reply).unwrap();
        }
    }

    fn set_notifications(&self, enabled: bool) {
        self.notifications.set(enabled);
    }
}
