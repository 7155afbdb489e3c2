//! Pin polarity of the stimulation and mirror outputs. Both idle high and
//! are asserted by pulling them low.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use stim_core::fabric::TaskSink;

/// GPIOTE task that moves an output pin.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PinTask {
    Set,
    Clr,
}

/// Pin level while no pulse is in progress.
pub const IDLE_HIGH: bool = true;

/// Task that returns a pin to its idle level.
pub const IDLE_TASK: PinTask = if IDLE_HIGH { PinTask::Set } else { PinTask::Clr };

/// GPIOTE task for an output sink; `None` for sinks that are not pins.
#[must_use]
pub const fn pin_task(sink: TaskSink) -> Option<PinTask> {
    match sink {
        TaskSink::OutputAssert | TaskSink::MirrorAssert => Some(active_task()),
        TaskSink::OutputRelease | TaskSink::MirrorRelease => Some(IDLE_TASK),
        _ => None,
    }
}

const fn active_task() -> PinTask {
    match IDLE_TASK {
        PinTask::Set => PinTask::Clr,
        PinTask::Clr => PinTask::Set,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_are_active_low() {
        assert_eq!(pin_task(TaskSink::OutputAssert), Some(PinTask::Clr));
        assert_eq!(pin_task(TaskSink::OutputRelease), Some(PinTask::Set));
        assert_eq!(pin_task(TaskSink::MirrorAssert), Some(PinTask::Clr));
        assert_eq!(pin_task(TaskSink::MirrorRelease), Some(PinTask::Set));
    }

    #[test]
    fn release_matches_idle_level() {
        assert_eq!(pin_task(TaskSink::OutputRelease), Some(IDLE_TASK));
        assert_eq!(IDLE_TASK, PinTask::Set);
        assert_eq!(pin_task(TaskSink::AdcSample), None);
        assert_eq!(pin_task(TaskSink::ChannelSelectStart), None);
    }
}
