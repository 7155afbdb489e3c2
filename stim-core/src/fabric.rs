//! Event routing fabric: timer events wired straight to peripheral tasks.
//!
//! The wiring is described as a graph of typed endpoints and only turned into
//! register addresses when it is installed, so the graph itself can be checked
//! on the host. Channels are handed out in order when connecting and installed
//! exactly once at boot.

use core::fmt;

use heapless::Vec;

/// Programmable PPI channels available on the nRF52833.
pub const MAX_CHANNELS: usize = 20;

/// Bitmask of enabled fabric channels.
pub type ChannelMask = u32;

/// Index of an allocated fabric channel.
pub type ChannelId = u8;

/// Hardware events that can drive a connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventSource {
    /// Pulse timer reached the leading edge of the pulse.
    PulseStart,
    /// Pulse timer reached the trailing edge.
    PulseEnd,
    MirrorStart,
    MirrorEnd,
    /// ADC finished converting a sample.
    AdcDone,
    /// State timer preload compare.
    StatePreload,
    /// State timer transition compare.
    StateTransition,
}

/// Peripheral tasks a connection can trigger.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskSink {
    /// Drive the stimulation output to its active level.
    OutputAssert,
    OutputRelease,
    MirrorAssert,
    MirrorRelease,
    /// Start an ADC conversion.
    AdcSample,
    /// Latch the pulse timer counter.
    PulseCapture,
    /// Start the held channel-select transfer.
    ChannelSelectStart,
    /// Start the held amplitude transfer.
    AmplitudeStart,
}

/// One event-to-task link occupying a fabric channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Connection {
    pub channel: ChannelId,
    pub event: EventSource,
    pub task: TaskSink,
}

/// Errors raised while describing or installing the wiring.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FabricError<E> {
    /// The same event is already wired to the same task.
    Duplicate { event: EventSource, task: TaskSink },
    OutOfChannels,
    /// Channels are allocated once; a second install is refused.
    AlreadyInstalled,
    Backend(E),
}

impl<E: fmt::Display> fmt::Display for FabricError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FabricError::Duplicate { event, task } => {
                write!(f, "{event:?} already routed to {task:?}")
            }
            FabricError::OutOfChannels => write!(f, "all {MAX_CHANNELS} channels in use"),
            FabricError::AlreadyInstalled => f.write_str("routing already installed"),
            FabricError::Backend(error) => write!(f, "backend error: {error}"),
        }
    }
}

/// Declarative wiring table.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RoutingTable {
    connections: Vec<Connection, MAX_CHANNELS>,
}

impl RoutingTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connections: Vec::new(),
        }
    }

    /// Wiring for the stimulator: output edges, ADC sampling and timestamping,
    /// and the two preload transfer starts. `mirror` additionally routes the
    /// mirror edges to the status pin.
    pub fn standard(mirror: bool) -> Result<Self, FabricError<core::convert::Infallible>> {
        let mut table = Self::new();
        table.connect(EventSource::PulseStart, TaskSink::OutputAssert)?;
        table.connect(EventSource::PulseEnd, TaskSink::OutputRelease)?;
        table.connect(EventSource::PulseStart, TaskSink::AdcSample)?;
        table.connect(EventSource::AdcDone, TaskSink::PulseCapture)?;
        table.connect(EventSource::StatePreload, TaskSink::ChannelSelectStart)?;
        table.connect(EventSource::StatePreload, TaskSink::AmplitudeStart)?;
        if mirror {
            table.connect(EventSource::MirrorStart, TaskSink::MirrorAssert)?;
            table.connect(EventSource::MirrorEnd, TaskSink::MirrorRelease)?;
        }
        Ok(table)
    }

    /// Links `event` to `task` on the next free channel.
    pub fn connect<E>(
        &mut self,
        event: EventSource,
        task: TaskSink,
    ) -> Result<ChannelId, FabricError<E>> {
        if self
            .connections
            .iter()
            .any(|existing| existing.event == event && existing.task == task)
        {
            return Err(FabricError::Duplicate { event, task });
        }

        let channel =
            ChannelId::try_from(self.connections.len()).map_err(|_| FabricError::OutOfChannels)?;
        self.connections
            .push(Connection {
                channel,
                event,
                task,
            })
            .map_err(|_| FabricError::OutOfChannels)?;
        Ok(channel)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Tasks triggered by `event`, in channel order.
    pub fn sinks_for(&self, event: EventSource) -> impl Iterator<Item = TaskSink> + '_ {
        self.connections
            .iter()
            .filter(move |connection| connection.event == event)
            .map(|connection| connection.task)
    }

    /// Events that trigger `task`, in channel order.
    pub fn sources_for(&self, task: TaskSink) -> impl Iterator<Item = EventSource> + '_ {
        self.connections
            .iter()
            .filter(move |connection| connection.task == task)
            .map(|connection| connection.event)
    }

    /// Mask with one bit per allocated channel.
    pub fn channel_mask(&self) -> ChannelMask {
        self.connections
            .iter()
            .fold(0, |mask, connection| mask | (1 << connection.channel))
    }
}

/// Register-level access to the routing hardware.
pub trait FabricBackend {
    type Error;

    /// Address of the event register behind `event`.
    fn event_address(&self, event: EventSource) -> u32;

    /// Address of the task register behind `task`.
    fn task_address(&self, task: TaskSink) -> u32;

    /// Points `channel` from `event_addr` to `task_addr` without enabling it.
    fn setup_connection(
        &mut self,
        channel: ChannelId,
        event_addr: u32,
        task_addr: u32,
    ) -> Result<(), Self::Error>;

    /// Enables every channel set in `mask`.
    fn enable(&mut self, mask: ChannelMask);
}

/// Owns the backend and guards the one-shot install.
pub struct Fabric<B> {
    backend: B,
    installed: Option<ChannelMask>,
}

impl<B: FabricBackend> Fabric<B> {
    pub const fn new(backend: B) -> Self {
        Self {
            backend,
            installed: None,
        }
    }

    /// Programs and enables every connection of `table`.
    pub fn install(&mut self, table: &RoutingTable) -> Result<ChannelMask, FabricError<B::Error>> {
        if self.installed.is_some() {
            return Err(FabricError::AlreadyInstalled);
        }

        for connection in table.connections() {
            let event_addr = self.backend.event_address(connection.event);
            let task_addr = self.backend.task_address(connection.task);
            self.backend
                .setup_connection(connection.channel, event_addr, task_addr)
                .map_err(FabricError::Backend)?;
        }

        let mask = table.channel_mask();
        self.backend.enable(mask);
        self.installed = Some(mask);
        Ok(mask)
    }

    /// Mask enabled by [`Self::install`], if it has run.
    pub fn installed_mask(&self) -> Option<ChannelMask> {
        self.installed
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingBackend {
        programmed: Vec<(ChannelId, u32, u32), MAX_CHANNELS>,
        enabled: ChannelMask,
    }

    impl FabricBackend for RecordingBackend {
        type Error = ();

        fn event_address(&self, event: EventSource) -> u32 {
            0x1000 + event as u32 * 4
        }

        fn task_address(&self, task: TaskSink) -> u32 {
            0x2000 + task as u32 * 4
        }

        fn setup_connection(
            &mut self,
            channel: ChannelId,
            event_addr: u32,
            task_addr: u32,
        ) -> Result<(), Self::Error> {
            self.programmed
                .push((channel, event_addr, task_addr))
                .map_err(|_| ())
        }

        fn enable(&mut self, mask: ChannelMask) {
            self.enabled |= mask;
        }
    }

    #[test]
    fn preload_instant_fans_out_to_both_transfers() {
        let table = RoutingTable::standard(false).expect("standard wiring");
        let sinks: Vec<TaskSink, 4> = table.sinks_for(EventSource::StatePreload).collect();
        assert_eq!(
            sinks.as_slice(),
            &[TaskSink::ChannelSelectStart, TaskSink::AmplitudeStart]
        );
        assert_eq!(
            table.sinks_for(EventSource::StateTransition).count(),
            0,
            "transition compare is serviced by the ISR, not the fabric"
        );
    }

    #[test]
    fn pulse_edges_drive_output_and_adc() {
        let table = RoutingTable::standard(false).expect("standard wiring");
        let start: Vec<TaskSink, 4> = table.sinks_for(EventSource::PulseStart).collect();
        assert_eq!(
            start.as_slice(),
            &[TaskSink::OutputAssert, TaskSink::AdcSample]
        );
        let capture: Vec<EventSource, 4> = table.sources_for(TaskSink::PulseCapture).collect();
        assert_eq!(capture.as_slice(), &[EventSource::AdcDone]);
        assert_eq!(table.sources_for(TaskSink::MirrorAssert).count(), 0);
    }

    #[test]
    fn mirror_adds_status_edges_on_fresh_channels() {
        let plain = RoutingTable::standard(false).expect("standard wiring");
        let mirrored = RoutingTable::standard(true).expect("mirrored wiring");

        assert_eq!(plain.connections().len(), 6);
        assert_eq!(mirrored.connections().len(), 8);
        assert_eq!(plain.channel_mask(), 0b11_1111);
        assert_eq!(mirrored.channel_mask(), 0b1111_1111);
    }

    #[test]
    fn duplicate_and_exhausted_connections_are_refused() {
        let mut table = RoutingTable::new();
        table
            .connect::<()>(EventSource::PulseStart, TaskSink::OutputAssert)
            .expect("first link");
        assert_eq!(
            table.connect::<()>(EventSource::PulseStart, TaskSink::OutputAssert),
            Err(FabricError::Duplicate {
                event: EventSource::PulseStart,
                task: TaskSink::OutputAssert
            })
        );

        let mut full = RoutingTable::new();
        let events = [
            EventSource::PulseStart,
            EventSource::PulseEnd,
            EventSource::MirrorStart,
            EventSource::MirrorEnd,
            EventSource::AdcDone,
            EventSource::StatePreload,
            EventSource::StateTransition,
        ];
        let tasks = [
            TaskSink::OutputAssert,
            TaskSink::OutputRelease,
            TaskSink::AdcSample,
        ];
        for event in events {
            for task in tasks {
                let _ = full.connect::<()>(event, task);
            }
        }
        assert_eq!(full.connections().len(), MAX_CHANNELS);
        assert_eq!(
            full.connect::<()>(EventSource::AdcDone, TaskSink::PulseCapture),
            Err(FabricError::OutOfChannels)
        );
    }

    #[test]
    fn install_programs_each_channel_once() {
        let table = RoutingTable::standard(false).expect("standard wiring");
        let mut fabric = Fabric::new(RecordingBackend::default());

        let mask = fabric.install(&table).expect("install");
        assert_eq!(mask, table.channel_mask());
        assert_eq!(fabric.backend().enabled, mask);
        assert_eq!(fabric.backend().programmed.len(), table.connections().len());

        let (channel, event_addr, task_addr) = fabric.backend().programmed[4];
        assert_eq!(channel, 4);
        assert_eq!(
            event_addr,
            fabric.backend().event_address(EventSource::StatePreload)
        );
        assert_eq!(
            task_addr,
            fabric.backend().task_address(TaskSink::ChannelSelectStart)
        );

        assert_eq!(fabric.install(&table), Err(FabricError::AlreadyInstalled));
        assert_eq!(fabric.installed_mask(), Some(mask));
    }
}
