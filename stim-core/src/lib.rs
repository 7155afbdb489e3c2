#![no_std]

// Portable pulse-sequencing logic shared by the nRF firmware and the host emulator.
//
// Nothing in here touches registers: hardware is reached through the traits in
// `sequencer`, `preload` and `fabric`, which the firmware binds to TIMER/PPI/SPIM
// and the emulator binds to simulated peripherals.

pub mod command;
pub mod config;
pub mod diagnostics;
pub mod fabric;
pub mod preload;
pub mod sequencer;
pub mod timing;
