//! Bounded diagnostics queue filled by the timing ISR and drained by a task.
//!
//! Pushing never waits: when the queue is full the record is discarded and an
//! overflow counter is bumped instead, so the ISR cost stays constant.

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use heapless::Deque;
use portable_atomic::{AtomicU32, Ordering};

use crate::preload::{OutputRole, PreloadError};
use crate::sequencer::Phase;

/// Default number of records retained between drains.
pub const DIAGNOSTICS_CAPACITY: usize = 32;

/// Something the sequencer wants an operator to know about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiagnosticEvent {
    Started,
    Stopped,
    /// A pending configuration change was picked up at a transition.
    UpdateApplied {
        frequency_hz: u32,
        pulse_width_units: u32,
        pulse_count: u8,
    },
    /// A prepare was refused; the previous value stays latched for that slot.
    PreloadDropped {
        role: OutputRole,
        phase: Phase,
        pulse_index: u8,
        error: PreloadError,
    },
    /// A start/stop write could not be issued.
    ImmediateWriteFailed {
        role: OutputRole,
        error: PreloadError,
    },
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticEvent::Started => f.write_str("sequencer started"),
            DiagnosticEvent::Stopped => f.write_str("sequencer stopped"),
            DiagnosticEvent::UpdateApplied {
                frequency_hz,
                pulse_width_units,
                pulse_count,
            } => write!(
                f,
                "update applied: {frequency_hz} Hz, width {pulse_width_units}, {pulse_count} pulses"
            ),
            DiagnosticEvent::PreloadDropped {
                role,
                phase,
                pulse_index,
                error,
            } => write!(
                f,
                "{role} preload dropped in {phase} #{pulse_index}: {error}"
            ),
            DiagnosticEvent::ImmediateWriteFailed { role, error } => {
                write!(f, "{role} immediate write failed: {error}")
            }
        }
    }
}

/// Event stamped with the transition counter at which it occurred.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DiagnosticRecord {
    pub transition: u32,
    pub event: DiagnosticEvent,
}

/// Fixed-capacity queue shared between the ISR and a draining task.
pub struct DiagnosticsRing<const N: usize = DIAGNOSTICS_CAPACITY> {
    records: Mutex<RefCell<Deque<DiagnosticRecord, N>>>,
    overflowed: AtomicU32,
}

impl<const N: usize> DiagnosticsRing<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Mutex::new(RefCell::new(Deque::new())),
            overflowed: AtomicU32::new(0),
        }
    }

    /// Queues a record, discarding it if the queue is full.
    pub fn push(&self, transition: u32, event: DiagnosticEvent) {
        let record = DiagnosticRecord { transition, event };
        let rejected =
            critical_section::with(|cs| self.records.borrow_ref_mut(cs).push_back(record).is_err());
        if rejected {
            self.overflowed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Removes the oldest record.
    pub fn pop(&self) -> Option<DiagnosticRecord> {
        critical_section::with(|cs| self.records.borrow_ref_mut(cs).pop_front())
    }

    /// Pops records one at a time, releasing the critical section between
    /// records so the ISR is never held off for a whole drain.
    pub fn drain(&self, mut sink: impl FnMut(DiagnosticRecord)) -> usize {
        let mut drained = 0;
        while let Some(record) = self.pop() {
            sink(record);
            drained += 1;
        }
        drained
    }

    /// Returns and resets the number of records discarded since the last call.
    pub fn take_overflow_count(&self) -> u32 {
        self.overflowed.swap(0, Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.records.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<const N: usize> Default for DiagnosticsRing<N> {
    fn default() -> Self {
        Self::new()
    }
}
