mod common;

use common::{advance_state, count_events, latched, sequencer};
use stim_core::config::{ConfigError, CycleConfig};
use stim_core::diagnostics::{DiagnosticEvent, DiagnosticsRing};
use stim_core::preload::{OutputPair, OutputRole, PreloadError};
use stim_core::sequencer::{Phase, Position, RunChange};

const PATTERNS: [u16; 8] = [
    0x0101, 0x0202, 0x0404, 0x0808, 0x1010, 0x2020, 0x4040, 0x8080,
];
const AMPLITUDES: [u16; 8] = [200, 450, 700, 950, 1200, 1450, 1700, 1950];

fn configured(frequency_hz: u32, width: u32) -> CycleConfig {
    let config = CycleConfig::new();
    config
        .set_channel_patterns(&PATTERNS)
        .expect("eight patterns");
    config
        .set_amplitude_values(&AMPLITUDES)
        .expect("eight amplitudes");
    config.set_pulse_width(width).expect("width in range");
    config.set_frequency(frequency_hz).expect("frequency in range");
    config
}

#[test]
fn burst_then_pause_fills_the_period() {
    let config = configured(10, 5);
    let diagnostics = DiagnosticsRing::new();
    let mut seq = sequencer(&config, &diagnostics);

    assert_eq!(seq.start(), RunChange::Changed);
    let first = seq.outputs().state_timer.last_arm();
    assert_eq!(first.transition_ticks, 600);
    assert_eq!(first.preload_ticks, 550);
    assert_eq!(latched(&seq), OutputPair::new(PATTERNS[0], AMPLITUDES[0]));

    for index in 1..8u8 {
        advance_state(&mut seq);
        assert_eq!(
            seq.state().position,
            Position {
                phase: Phase::Pulse,
                pulse_index: index
            }
        );
        let slot = usize::from(index);
        assert_eq!(
            latched(&seq),
            OutputPair::new(PATTERNS[slot], AMPLITUDES[slot])
        );
        assert_eq!(seq.outputs().state_timer.last_arm().transition_ticks, 600);
    }

    advance_state(&mut seq);
    assert_eq!(seq.state().position, Position::PAUSE);
    assert_eq!(latched(&seq), OutputPair::SILENT);
    let pause = seq.outputs().state_timer.last_arm();
    assert_eq!(pause.transition_ticks, 95_200);
    assert_eq!(pause.preload_ticks, 95_150);
    assert!(!seq.outputs().pulse_timer.enabled);
    assert!(!seq.outputs().pulse_timer.indicator);

    advance_state(&mut seq);
    assert_eq!(seq.state().position, Position::FIRST_PULSE);
    assert_eq!(latched(&seq), OutputPair::new(PATTERNS[0], AMPLITUDES[0]));
    assert!(seq.outputs().pulse_timer.enabled);
    assert!(seq.outputs().pulse_timer.indicator);
    assert_eq!(seq.state().transition_count, 9);
    assert_eq!(seq.state().preload_count, 9);
}

#[test]
fn frequency_at_derived_maximum_is_accepted() {
    let config = configured(10, 5);
    assert_eq!(config.max_frequency(), 100);
    assert_eq!(config.set_frequency(100), Ok(()));

    config
        .set_channel_patterns(&[1; 16])
        .expect("sixteen patterns");
    config.set_pulse_width(10).expect("width in range");
    assert_eq!(config.max_frequency(), 56);
    assert_eq!(config.frequency_hz(), 56);
    assert_eq!(
        config.set_frequency(57),
        Err(ConfigError::FrequencyOutOfRange {
            requested: 57,
            max: 56
        })
    );
}

#[test]
fn shorter_pattern_table_takes_effect_at_the_next_boundary() {
    let config = configured(10, 5);
    let diagnostics = DiagnosticsRing::new();
    let mut seq = sequencer(&config, &diagnostics);
    seq.start();

    advance_state(&mut seq);
    advance_state(&mut seq);
    config
        .set_channel_patterns(&[0x0011, 0x0022, 0x0044, 0x0088])
        .expect("four patterns");
    assert_eq!(seq.active_config().pulse_count, 8);

    // Pulse 3 was staged from the old table; the update lands on this edge.
    advance_state(&mut seq);
    assert_eq!(seq.active_config().pulse_count, 4);
    assert_eq!(seq.state().position.pulse_index, 3);

    advance_state(&mut seq);
    assert_eq!(seq.state().position, Position::PAUSE);

    let mut visited = Vec::new();
    advance_state(&mut seq);
    while seq.state().position.phase == Phase::Pulse {
        visited.push(seq.state().position.pulse_index);
        assert_eq!(latched(&seq).pattern, 0x0011 << (visited.len() - 1));
        advance_state(&mut seq);
    }
    assert_eq!(visited, [0, 1, 2, 3]);
}

#[test]
fn pattern_shrink_past_current_index_goes_straight_to_pause() {
    let config = configured(10, 5);
    let diagnostics = DiagnosticsRing::new();
    let mut seq = sequencer(&config, &diagnostics);
    seq.start();

    for _ in 0..6 {
        advance_state(&mut seq);
    }
    assert_eq!(seq.state().position.pulse_index, 6);

    config
        .set_channel_patterns(&[0x0011, 0x0022, 0x0044, 0x0088])
        .expect("four patterns");
    advance_state(&mut seq);
    assert_eq!(seq.state().position, Position::PAUSE);
    assert!(!seq.outputs().pulse_timer.enabled);
}

#[test]
fn stop_mid_burst_silences_and_restart_begins_at_pulse_zero() {
    let config = configured(10, 5);
    let diagnostics = DiagnosticsRing::new();
    let mut seq = sequencer(&config, &diagnostics);
    seq.start();
    for _ in 0..5 {
        advance_state(&mut seq);
    }
    assert_eq!(seq.state().position.pulse_index, 5);
    seq.outputs_mut().pulse_timer.fire_pulse_start();
    assert!(seq.outputs().pulse_timer.output_asserted);

    assert_eq!(seq.stop(), RunChange::Changed);
    assert!(!seq.outputs().pulse_timer.output_asserted);
    assert_eq!(seq.outputs().pulse_timer.releases, 1);
    assert!(!seq.is_running());
    assert_eq!(latched(&seq), OutputPair::SILENT);
    assert!(!seq.outputs().state_timer.running);
    assert!(!seq.outputs().pulse_timer.enabled);
    assert!(!seq.outputs().pulse_timer.indicator);
    assert_eq!(seq.outputs().channel_select.held, None);
    assert_eq!(seq.outputs().amplitude.held, None);

    assert_eq!(seq.start(), RunChange::Changed);
    assert_eq!(seq.state().position, Position::FIRST_PULSE);
    assert_eq!(
        seq.outputs().channel_select.immediate.last(),
        Some(&PATTERNS[0])
    );
    assert_eq!(
        seq.outputs().amplitude.immediate.last(),
        Some(&AMPLITUDES[0])
    );
    assert_eq!(seq.outputs().state_timer.last_arm().transition_ticks, 600);
}

#[test]
fn repeated_start_and_stop_change_nothing() {
    let config = configured(10, 5);
    let diagnostics = DiagnosticsRing::new();
    let mut seq = sequencer(&config, &diagnostics);

    assert_eq!(seq.stop(), RunChange::Unchanged);
    assert_eq!(seq.stop(), RunChange::Unchanged);
    assert_eq!(latched(&seq), OutputPair::SILENT);
    assert_eq!(seq.outputs().pulse_timer.releases, 2);

    seq.start();
    advance_state(&mut seq);
    advance_state(&mut seq);
    let arms = seq.outputs().state_timer.armed.len();

    assert_eq!(seq.start(), RunChange::Unchanged);
    assert_eq!(seq.state().position.pulse_index, 2);
    assert_eq!(seq.outputs().state_timer.armed.len(), arms);

    assert_eq!(
        count_events(&diagnostics, |event| *event == DiagnosticEvent::Started),
        1
    );
}

#[test]
fn parameter_update_is_applied_once_at_a_transition() {
    let config = configured(10, 5);
    let diagnostics = DiagnosticsRing::new();
    let mut seq = sequencer(&config, &diagnostics);
    seq.start();
    let configures = seq.outputs().pulse_timer.configures;

    config.set_pulse_width(3).expect("width in range");
    assert!(config.is_update_pending());
    assert_eq!(seq.active_config().pulse_width_units, 5);
    assert_eq!(seq.outputs().pulse_timer.configures, configures);

    advance_state(&mut seq);
    assert!(!config.is_update_pending());
    assert_eq!(seq.active_config().pulse_width_units, 3);
    assert_eq!(seq.outputs().pulse_timer.configures, configures + 1);
    assert_eq!(seq.outputs().state_timer.last_arm().transition_ticks, 400);
    let waveform = seq.outputs().pulse_timer.waveform.expect("configured");
    assert_eq!(waveform.end - waveform.start, 300);

    advance_state(&mut seq);
    assert_eq!(seq.outputs().pulse_timer.configures, configures + 1);
    assert_eq!(
        count_events(&diagnostics, |event| matches!(
            event,
            DiagnosticEvent::UpdateApplied {
                pulse_width_units: 3,
                ..
            }
        )),
        1
    );
}

#[test]
fn update_during_pause_keeps_pulse_timer_off() {
    let config = configured(10, 5);
    let diagnostics = DiagnosticsRing::new();
    let mut seq = sequencer(&config, &diagnostics);
    seq.start();
    for _ in 0..8 {
        advance_state(&mut seq);
    }
    assert_eq!(seq.state().position, Position::PAUSE);

    config.set_frequency(20).expect("frequency in range");
    advance_state(&mut seq);
    assert_eq!(seq.active_config().frequency_hz, 20);
    assert_eq!(seq.state().position, Position::FIRST_PULSE);
    assert!(seq.outputs().pulse_timer.enabled);

    for _ in 0..8 {
        advance_state(&mut seq);
    }
    assert_eq!(seq.state().position, Position::PAUSE);
    assert!(!seq.outputs().pulse_timer.enabled);
    assert_eq!(
        seq.outputs().state_timer.last_arm().transition_ticks,
        50_000 - 4_800
    );
}

#[test]
fn busy_output_drops_the_value_and_keeps_timing() {
    let config = configured(10, 5);
    let diagnostics = DiagnosticsRing::new();
    let mut seq = sequencer(&config, &diagnostics);
    seq.start();
    let _ = count_events(&diagnostics, |_| false);

    seq.outputs_mut().amplitude.force_busy = true;
    advance_state(&mut seq);
    advance_state(&mut seq);

    assert!(seq.is_running());
    assert_eq!(seq.state().position.pulse_index, 2);
    assert_eq!(seq.outputs().state_timer.armed.len(), 3);
    assert_eq!(latched(&seq).pattern, PATTERNS[2]);
    assert_eq!(latched(&seq).amplitude, AMPLITUDES[1]);

    let mut dropped = Vec::new();
    diagnostics.drain(|record| {
        if let DiagnosticEvent::PreloadDropped { role, error, .. } = record.event {
            dropped.push((record.transition, role, error));
        }
    });
    assert_eq!(
        dropped,
        [
            (1, OutputRole::Amplitude, PreloadError::Busy),
            (2, OutputRole::Amplitude, PreloadError::Busy),
        ]
    );
}

#[test]
fn events_after_stop_are_ignored() {
    let config = configured(10, 5);
    let diagnostics = DiagnosticsRing::new();
    let mut seq = sequencer(&config, &diagnostics);
    seq.start();
    advance_state(&mut seq);
    seq.stop();

    let arms = seq.outputs().state_timer.armed.len();
    let state = seq.state();
    seq.on_preload_event();
    seq.on_transition_event();

    assert_eq!(seq.state(), state);
    assert_eq!(seq.outputs().state_timer.armed.len(), arms);
    assert_eq!(latched(&seq), OutputPair::SILENT);
}
