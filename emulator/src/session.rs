use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant as HostInstant};

use stim_core::command::CommandExecutor;
use stim_core::config::CycleConfig;
use stim_core::diagnostics::DiagnosticsRing;
use stim_core::sequencer::{Phase, Sequencer};

use crate::sim::{self, SimEvent, SimSequencer, Simulator};

/// Longest virtual run accepted by `run`.
const MAX_RUN_MS: u64 = 60_000;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "run",
        "run <ms>            - advance virtual time, firing timer events",
    ),
    (
        "trace",
        "trace [on|off]      - print transitions during `run`; bare `trace` shows the last cycle",
    ),
    (
        "timing",
        "timing              - show derived intervals and the pulse waveform",
    ),
    (
        "diag",
        "diag                - drain queued sequencer diagnostics",
    ),
];

pub struct Session<'a> {
    config: &'a CycleConfig,
    diagnostics: &'a DiagnosticsRing,
    sequencer: &'a SimSequencer<'a>,
    executor: CommandExecutor<'a, &'a SimSequencer<'a>>,
    simulator: Simulator,
    trace: bool,
    current_cycle: Vec<String>,
    /// Transitions of the most recent cycle that reached its pause.
    last_cycle: Vec<String>,
    transcript: Option<TranscriptLogger>,
    started_at: HostInstant,
}

impl<'a> Session<'a> {
    pub fn new(
        config: &'a CycleConfig,
        diagnostics: &'a DiagnosticsRing,
        sequencer: &'a SimSequencer<'a>,
    ) -> Self {
        sequencer.install(Sequencer::new(
            config,
            diagnostics,
            sim::outputs(),
            sim::PROFILE,
        ));

        Self {
            config,
            diagnostics,
            sequencer,
            executor: CommandExecutor::new(config, sequencer),
            simulator: Simulator::new(),
            trace: false,
            current_cycle: Vec::new(),
            last_cycle: Vec::new(),
            transcript: None,
            started_at: HostInstant::now(),
        }
    }

    /// Mirrors every exchanged line into `path`.
    pub fn with_transcript(mut self, path: &Path) -> io::Result<Self> {
        self.transcript = Some(TranscriptLogger::new(path)?);
        Ok(self)
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        self.record(elapsed, TranscriptRole::Host, &[trimmed.to_string()])?;

        let mut words = trimmed.split_whitespace();
        let head = words.next().unwrap_or_default().to_ascii_lowercase();
        let lines = match head.as_str() {
            "run" => self.handle_run(words.next()),
            "trace" => self.handle_trace(words.next()),
            "timing" => self.handle_timing(),
            "diag" => self.drain_diagnostics(),
            "help" => self.handle_help(),
            _ => vec![self.executor.respond(trimmed).to_string()],
        };

        self.record(elapsed, TranscriptRole::Emulator, &lines)?;
        Ok(lines)
    }

    fn handle_run(&mut self, argument: Option<&str>) -> Vec<String> {
        let Some(ms) = argument.and_then(|text| text.parse::<u64>().ok()) else {
            return vec!["ERR usage: run <ms>".to_string()];
        };
        if ms > MAX_RUN_MS {
            return vec![format!("ERR run is limited to {MAX_RUN_MS} ms")];
        }

        let trace = self.trace;
        let mut lines = Vec::new();
        let current_cycle = &mut self.current_cycle;
        let last_cycle = &mut self.last_cycle;
        let summary = self.simulator.run_for(self.sequencer, ms * 1_000, |event| {
            let SimEvent::Transition {
                at_us,
                position,
                outputs,
                pulse_timer_enabled,
            } = event
            else {
                return;
            };

            let label = match position.phase {
                Phase::Pulse => format!("PULSE {:>2}", position.pulse_index),
                Phase::Pause => "PAUSE   ".to_string(),
            };
            let line = format!(
                "[{at_us:>9} us] {label} MUX=0x{:04X} DAC={:<4} timer={}",
                outputs.pattern,
                outputs.amplitude,
                if pulse_timer_enabled { "on" } else { "off" }
            );
            if trace {
                lines.push(line.clone());
            }
            current_cycle.push(line);
            if position.phase == Phase::Pause {
                *last_cycle = std::mem::take(current_cycle);
            }
        });

        lines.push(format!(
            "t={} ms: {} transitions, {} pulses, {} pauses",
            self.simulator.now_us() / 1_000,
            summary.transitions,
            summary.pulses,
            summary.pauses
        ));
        lines.extend(self.drain_diagnostics());
        lines
    }

    fn handle_trace(&mut self, argument: Option<&str>) -> Vec<String> {
        match argument.map(str::to_ascii_lowercase).as_deref() {
            Some("on") => self.trace = true,
            Some("off") => self.trace = false,
            None => {}
            Some(other) => return vec![format!("ERR unknown trace mode `{other}`")],
        }

        let mut lines = vec![format!("trace {}", if self.trace { "on" } else { "off" })];
        if argument.is_none() {
            if self.last_cycle.is_empty() {
                lines.push("no complete cycle yet".to_string());
            } else {
                lines.extend(self.last_cycle.iter().cloned());
            }
        }
        lines
    }

    fn handle_timing(&self) -> Vec<String> {
        let snapshot = self.config.snapshot();
        let mut lines = vec![format!(
            "period {} us: {} x {} us pulses, pause {} us, max {} Hz",
            stim_core::timing::period_us(snapshot.frequency_hz),
            snapshot.pulse_count,
            snapshot.single_pulse_us(),
            snapshot.pause_us(),
            self.config.max_frequency()
        )];

        let device = self.sequencer.with(|seq| {
            let outputs = seq.outputs();
            (
                outputs.pulse_timer.waveform(),
                outputs.pulse_timer.indicator(),
                outputs.channel_select.transfers(),
                outputs.amplitude.transfers(),
            )
        });
        if let Some((waveform, indicator, mux_transfers, dac_transfers)) = device {
            match waveform {
                Some(wave) => lines.push(format!(
                    "pulse timer: on {}..{} mirror {}..{} wrap {}",
                    wave.start, wave.end, wave.mirror_start, wave.mirror_end, wave.wrap
                )),
                None => lines.push("pulse timer: not configured".to_string()),
            }
            lines.push(format!(
                "indicator {}, transfers MUX={mux_transfers} DAC={dac_transfers}",
                if indicator { "on" } else { "off" }
            ));
        }
        lines
    }

    fn drain_diagnostics(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.diagnostics.drain(|record| {
            lines.push(format!("diag [T{}] {}", record.transition, record.event));
        });
        let dropped = self.diagnostics.take_overflow_count();
        if dropped > 0 {
            lines.push(format!("diag {dropped} records lost to overflow"));
        }
        lines
    }

    fn handle_help(&mut self) -> Vec<String> {
        let mut lines = vec![
            format!("Protocol: {}", self.executor.respond("HELP")),
            "Emulator commands:".to_string(),
        ];
        for (_, detail) in HELP_TOPICS {
            lines.push(format!("  {detail}"));
        }
        lines
    }

    fn record(&mut self, elapsed: Duration, role: TranscriptRole, lines: &[String]) -> io::Result<()> {
        if let Some(transcript) = self.transcript.as_mut() {
            for line in lines {
                transcript.append_line(elapsed, role, line)?;
            }
        }
        Ok(())
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header()?;
        Ok(logger)
    }

    fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.writer, "# Stimulator emulator transcript")?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

#[derive(Clone, Copy)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_lines_get_framed_replies() {
        let config = CycleConfig::new();
        let diagnostics = DiagnosticsRing::new();
        let sequencer = SimSequencer::new();
        let mut session = Session::new(&config, &diagnostics, &sequencer);

        let reply = session.handle_command("SF;10").expect("handled");
        assert_eq!(reply, [">SFOK<"]);
        let reply = session.handle_command(">SC;0<").expect("handled");
        assert_eq!(reply, [">SCERR<"]);
        let reply = session.handle_command("status").expect("handled");
        assert_eq!(reply, [">F=10;W=5;N=8;RUN=0;T=0<"]);
    }

    #[test]
    fn run_advances_virtual_time_and_reports_transitions() {
        let config = CycleConfig::new();
        let diagnostics = DiagnosticsRing::new();
        let sequencer = SimSequencer::new();
        let mut session = Session::new(&config, &diagnostics, &sequencer);

        session.handle_command("SF;10").expect("handled");
        session.handle_command("SON").expect("handled");
        let lines = session.handle_command("run 100").expect("handled");
        assert_eq!(lines[0], "t=100 ms: 9 transitions, 8 pulses, 1 pauses");
        assert_eq!(lines[1], "diag [T0] sequencer started");

        let status = session.handle_command("STATUS").expect("handled");
        assert_eq!(status, [">F=10;W=5;N=8;RUN=1;T=9<"]);
    }

    #[test]
    fn trace_lists_each_state() {
        let config = CycleConfig::new();
        let diagnostics = DiagnosticsRing::new();
        let sequencer = SimSequencer::new();
        let mut session = Session::new(&config, &diagnostics, &sequencer);

        session.handle_command("SC;0x0101,0x0202").expect("handled");
        session.handle_command("SA;300,600").expect("handled");
        session.handle_command("trace on").expect("handled");
        session.handle_command("SON").expect("handled");
        let lines = session.handle_command("run 2").expect("handled");

        assert!(lines[0].contains("PULSE  1 MUX=0x0202 DAC=600"), "{}", lines[0]);
        assert!(lines[1].contains("PAUSE"), "{}", lines[1]);
        assert_eq!(lines[2], "t=2 ms: 2 transitions, 1 pulses, 1 pauses");
    }

    #[test]
    fn bare_trace_shows_the_last_completed_cycle() {
        let config = CycleConfig::new();
        let diagnostics = DiagnosticsRing::new();
        let sequencer = SimSequencer::new();
        let mut session = Session::new(&config, &diagnostics, &sequencer);

        assert_eq!(
            session.handle_command("trace").expect("handled"),
            ["trace off", "no complete cycle yet"]
        );

        session.handle_command("SC;0x0101,0x0202").expect("handled");
        session.handle_command("SA;300,600").expect("handled");
        session.handle_command("SF;10").expect("handled");
        session.handle_command("SON").expect("handled");
        let lines = session.handle_command("run 250").expect("handled");
        assert_eq!(lines[0], "t=250 ms: 8 transitions, 5 pulses, 3 pauses");

        let lines = session.handle_command("trace").expect("handled");
        assert_eq!(lines.len(), 4, "{lines:?}");
        assert_eq!(lines[0], "trace off");
        assert!(lines[1].contains("[   200000 us] PULSE  0 MUX=0x0101 DAC=300"), "{}", lines[1]);
        assert!(lines[2].contains("PULSE  1 MUX=0x0202 DAC=600"), "{}", lines[2]);
        assert!(lines[3].contains("[   201200 us] PAUSE"), "{}", lines[3]);
    }

    #[test]
    fn malformed_emulator_commands_explain_usage() {
        let config = CycleConfig::new();
        let diagnostics = DiagnosticsRing::new();
        let sequencer = SimSequencer::new();
        let mut session = Session::new(&config, &diagnostics, &sequencer);

        assert_eq!(
            session.handle_command("run soon").expect("handled"),
            ["ERR usage: run <ms>"]
        );
        assert_eq!(
            session.handle_command("trace maybe").expect("handled"),
            ["ERR unknown trace mode `maybe`"]
        );
        assert_eq!(session.handle_command("bogus").expect("handled"), [">ERR<"]);
    }
}
