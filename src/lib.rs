//! # Apple 1 Emulator
//!
//! An Apple 1 built around a MOS 6502 core: 64KB of memory with the
//! machine's write-protection rules, the 6820 PIA that connects the
//! keyboard and display, and a run loop that paces the CPU against the
//! wall clock on its own thread.
//!
//! ## Features
//!
//! - All documented 6502 opcodes with cycle counts, page-crossing penalties
//!   and decimal mode, plus the undocumented lock-up and skip opcodes
//! - IRQ and NMI lines that may be raised from any thread
//! - PIA keyboard/display handshake at 0xD010-0xD013
//! - Monitor, BASIC and Krusader ROM loading, hex and binary memory files
//! - Save states, an HTTP control server and Prometheus metrics
//!
//! ## Example
//!
//! ```rust
//! use apple1_emulator::cpu::CPU;
//! use apple1_emulator::memory::Memory;
//!
//! let memory = Memory::new();
//! let mut cpu = CPU::new();
//!
//! // LDA #$42; BRK
//! memory.load_image(&[0xA9, 0x42, 0x00], 0x0280).unwrap();
//! memory.write_u16(0xFFFC, 0x0280);
//!
//! cpu.reset(&memory);
//! cpu.step(&memory);
//!
//! assert_eq!(cpu.get_register_a(), 0x42);
//! ```

#![recursion_limit = "512"]

pub mod config;
pub mod cpu;
pub mod error;
pub mod keyboard;
pub mod machine;
pub mod memfile;
pub mod memory;
pub mod metrics;
pub mod opcodes;
pub mod pia;
pub mod rom;
pub mod runner;
pub mod server;
pub mod snapshots;
mod sync;
pub mod terminal;

pub use cpu::CPU;
pub use error::EmulatorError;
pub use machine::Machine;
pub use memory::Memory;
