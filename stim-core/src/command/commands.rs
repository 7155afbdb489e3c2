//! Command dispatcher shared by the firmware transport and the host emulator.
//!
//! Parsed requests are applied to the [`CycleConfig`] and the run control, and
//! every outcome is turned into a single framed reply line.

use core::fmt;

use crate::config::{Adjustment, ConfigError, CycleConfig};
use crate::sequencer::RunControl;

use super::grammar::{self, Command, CommandTag, FRAME_END, FRAME_START, ParseError};

/// Latest ADC sample correlated with a pulse edge.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SampleReading {
    pub millivolts: u16,
    /// Pulse timer count captured when the conversion finished.
    pub capture_tick: u32,
}

/// Configuration and run state reported by `STATUS`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatusReport {
    pub frequency_hz: u32,
    pub pulse_width_units: u32,
    pub pulse_count: u8,
    pub running: bool,
    pub transitions: u32,
    pub sample: Option<SampleReading>,
}

/// One framed response line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Reply {
    Ok(CommandTag),
    /// Accepted, but the frequency had to be lowered to the given value.
    OkClamped { tag: CommandTag, frequency_hz: u32 },
    Rejected(CommandTag),
    /// The request could not be parsed.
    Unparsable,
    Status(StatusReport),
    Help,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{FRAME_START}")?;
        match self {
            Reply::Ok(tag) => write!(f, "{tag}OK")?,
            Reply::OkClamped { tag, frequency_hz } => write!(f, "{tag}OK;F={frequency_hz}")?,
            Reply::Rejected(tag) => write!(f, "{tag}ERR")?,
            Reply::Unparsable => f.write_str("ERR")?,
            Reply::Status(report) => {
                write!(
                    f,
                    "F={};W={};N={};RUN={};T={}",
                    report.frequency_hz,
                    report.pulse_width_units,
                    report.pulse_count,
                    u8::from(report.running),
                    report.transitions
                )?;
                if let Some(sample) = report.sample {
                    write!(f, ";ADC={}@{}", sample.millivolts, sample.capture_tick)?;
                }
            }
            Reply::Help => {
                for (index, tag) in CommandTag::ALL
                    .iter()
                    .filter(|tag| **tag != CommandTag::Help)
                    .enumerate()
                {
                    if index > 0 {
                        f.write_str(";")?;
                    }
                    f.write_str(tag.keyword())?;
                }
            }
        }
        write!(f, "{FRAME_END}")
    }
}

/// Errors surfaced while executing a request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandError<'a> {
    Parse(ParseError<'a>),
    Config { tag: CommandTag, error: ConfigError },
}

impl<'a> From<ParseError<'a>> for CommandError<'a> {
    fn from(error: ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

impl CommandError<'_> {
    /// Reply sent to the operator for this error.
    #[must_use]
    pub fn reply(&self) -> Reply {
        match self {
            CommandError::Parse(_) => Reply::Unparsable,
            CommandError::Config { tag, .. } => Reply::Rejected(*tag),
        }
    }
}

impl fmt::Display for CommandError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(error) => error.fmt(f),
            CommandError::Config { tag, error } => write!(f, "{tag} rejected: {error}"),
        }
    }
}

/// Source of the latest ADC correlation, when the target has one.
pub type SampleSource = fn() -> Option<SampleReading>;

/// Applies requests to the configuration store and the sequencer.
pub struct CommandExecutor<'a, R> {
    config: &'a CycleConfig,
    run: R,
    sample_source: Option<SampleSource>,
}

impl<'a, R> CommandExecutor<'a, R>
where
    R: RunControl,
{
    pub const fn new(config: &'a CycleConfig, run: R) -> Self {
        Self {
            config,
            run,
            sample_source: None,
        }
    }

    /// Reports ADC correlation data in `STATUS` replies.
    #[must_use]
    pub const fn with_sample_source(mut self, source: SampleSource) -> Self {
        self.sample_source = Some(source);
        self
    }

    pub fn run_control(&self) -> &R {
        &self.run
    }

    /// Parses and applies one request line.
    pub fn execute<'l>(&mut self, line: &'l str) -> Result<Reply, CommandError<'l>> {
        let command = grammar::parse(line)?;
        self.apply(command)
    }

    /// Like [`Self::execute`] but folds errors into their reply.
    pub fn respond(&mut self, line: &str) -> Reply {
        self.execute(line).unwrap_or_else(|error| error.reply())
    }

    /// Applies an already parsed command.
    pub fn apply<'l>(&mut self, command: Command) -> Result<Reply, CommandError<'l>> {
        let tag = command.tag();
        let rejected = |error| CommandError::Config { tag, error };

        let reply = match command {
            Command::SetFrequency(hz) => {
                self.config.set_frequency(hz).map_err(rejected)?;
                Reply::Ok(tag)
            }
            Command::SetPulseWidth(width) => {
                let adjustment = self.config.set_pulse_width(width).map_err(rejected)?;
                accepted(tag, adjustment)
            }
            Command::SetChannelPatterns(patterns) => {
                let adjustment = self.config.set_channel_patterns(&patterns).map_err(rejected)?;
                accepted(tag, adjustment)
            }
            Command::SetAmplitudes(amplitudes) => {
                self.config.set_amplitude_values(&amplitudes).map_err(rejected)?;
                Reply::Ok(tag)
            }
            Command::Start => {
                let _ = self.run.start();
                Reply::Ok(tag)
            }
            Command::Stop => {
                let _ = self.run.stop();
                Reply::Ok(tag)
            }
            Command::Status => Reply::Status(self.status()),
            Command::Help => Reply::Help,
        };

        Ok(reply)
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            frequency_hz: self.config.frequency_hz(),
            pulse_width_units: self.config.pulse_width_units(),
            pulse_count: self.config.pulse_count(),
            running: self.run.is_running(),
            transitions: self.run.transition_count(),
            sample: self.sample_source.and_then(|source| source()),
        }
    }
}

fn accepted(tag: CommandTag, adjustment: Adjustment) -> Reply {
    match adjustment {
        Adjustment::Unchanged => Reply::Ok(tag),
        Adjustment::FrequencyClamped { to, .. } => Reply::OkClamped {
            tag,
            frequency_hz: to,
        },
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::string::ToString;

    use super::*;
    use crate::sequencer::RunChange;

    #[derive(Default)]
    struct MockRun {
        running: bool,
        starts: usize,
        stops: usize,
    }

    impl RunControl for MockRun {
        fn start(&mut self) -> RunChange {
            self.starts += 1;
            if self.running {
                RunChange::Unchanged
            } else {
                self.running = true;
                RunChange::Changed
            }
        }

        fn stop(&mut self) -> RunChange {
            self.stops += 1;
            if self.running {
                self.running = false;
                RunChange::Changed
            } else {
                RunChange::Unchanged
            }
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn transition_count(&self) -> u32 {
            42
        }
    }

    fn executor(config: &CycleConfig) -> CommandExecutor<'_, MockRun> {
        CommandExecutor::new(config, MockRun::default())
    }

    #[test]
    fn setters_reply_with_tagged_ok() {
        let config = CycleConfig::new();
        let mut exec = executor(&config);

        assert_eq!(exec.respond("SF;10").to_string(), ">SFOK<");
        assert_eq!(config.frequency_hz(), 10);
        assert_eq!(exec.respond("SW;3").to_string(), ">SWOK<");
        assert_eq!(exec.respond("SC;1,2,4,8").to_string(), ">SCOK<");
        assert_eq!(config.pulse_count(), 4);
        assert_eq!(exec.respond("SA;100,200").to_string(), ">SAOK<");
    }

    #[test]
    fn rejected_values_reply_with_tagged_err() {
        let config = CycleConfig::new();
        let mut exec = executor(&config);

        assert_eq!(exec.respond("SF;101").to_string(), ">SFERR<");
        assert_eq!(exec.respond("SW;0").to_string(), ">SWERR<");
        assert_eq!(exec.respond("SC;0,0").to_string(), ">SCERR<");
        assert_eq!(exec.respond("SA;5000").to_string(), ">SAERR<");
        assert_eq!(exec.respond("bogus").to_string(), ">ERR<");

        let err = exec.execute("SF;500").expect_err("above bound");
        assert!(matches!(
            err,
            CommandError::Config {
                tag: CommandTag::Frequency,
                error: ConfigError::FrequencyOutOfRange { requested: 500, .. }
            }
        ));
    }

    #[test]
    fn clamped_updates_report_new_frequency() {
        let config = CycleConfig::new();
        let mut exec = executor(&config);

        exec.respond("SF;100");
        exec.respond("SC;1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1");
        assert_eq!(exec.respond("SW;10").to_string(), ">SWOK;F=56<");
        assert_eq!(config.frequency_hz(), 56);
    }

    #[test]
    fn start_and_stop_are_idempotent_successes() {
        let config = CycleConfig::new();
        let mut exec = executor(&config);

        assert_eq!(exec.respond("SON").to_string(), ">SONOK<");
        assert_eq!(exec.respond("SON").to_string(), ">SONOK<");
        assert!(exec.run_control().running);
        assert_eq!(exec.respond("SOFF").to_string(), ">SOFFOK<");
        assert_eq!(exec.respond("SOFF").to_string(), ">SOFFOK<");
        assert_eq!(exec.run_control().starts, 2);
        assert_eq!(exec.run_control().stops, 2);
    }

    #[test]
    fn status_and_help_render_single_frames() {
        let config = CycleConfig::new();
        let mut exec = executor(&config);
        exec.respond("SON");

        assert_eq!(
            exec.respond(">STATUS<").to_string(),
            ">F=1;W=5;N=8;RUN=1;T=42<"
        );
        assert_eq!(
            exec.respond("HELP").to_string(),
            ">SF;SW;SC;SA;SON;SOFF;STATUS<"
        );

        let mut exec = CommandExecutor::new(&config, MockRun::default()).with_sample_source(|| {
            Some(SampleReading {
                millivolts: 1_800,
                capture_tick: 12,
            })
        });
        assert_eq!(
            exec.respond("STATUS").to_string(),
            ">F=1;W=5;N=8;RUN=0;T=42;ADC=1800@12<"
        );
    }
}
