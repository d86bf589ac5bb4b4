//! The assembled Apple 1: memory and PIA, the run controller, the display
//! terminal and the keyboard queue, plus the reset and toggle operations
//! the front end drives.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::info;

use crate::config::Settings;
use crate::cpu::IRQ_VECTOR;
use crate::error::Result;
use crate::keyboard::Keyboard;
use crate::memfile;
use crate::memory::Memory;
use crate::metrics::record_reset;
use crate::rom::RomSource;
use crate::runner::RunController;
use crate::snapshots::MachineSnapshot;
use crate::sync::lock;
use crate::terminal::{Output, Terminal};

pub struct Machine {
    memory: Arc<Memory>,
    runner: RunController,
    terminal: Mutex<Terminal>,
    keyboard: Keyboard,
    roms: Mutex<RomSource>,
    settings: Mutex<Settings>,
    // Serializes resets against each other
    lifecycle: Mutex<()>,
}

impl Machine {
    /// Builds a powered-off machine. Nothing is read from disk until the
    /// first hard reset.
    pub fn new(settings: Settings, rom_dir: impl Into<PathBuf>) -> Result<Self> {
        let memory = Arc::new(Memory::new());
        memory.set_ram8k(settings.ram8k);
        memory.set_write_in_rom(settings.write_in_rom);

        let mut terminal = Terminal::new();
        terminal.set_speed(settings.terminal_speed)?;

        Ok(Machine {
            runner: RunController::new(Arc::clone(&memory)),
            memory,
            terminal: Mutex::new(terminal),
            keyboard: Keyboard::new(),
            roms: Mutex::new(RomSource::new(rom_dir, settings.krusader_rom)),
            settings: Mutex::new(settings),
            lifecycle: Mutex::new(()),
        })
    }

    pub fn memory(&self) -> &Arc<Memory> {
        &self.memory
    }

    pub fn runner(&self) -> &RunController {
        &self.runner
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn settings(&self) -> Settings {
        lock(&self.settings).clone()
    }

    pub fn power_on(&self) -> Result<()> {
        info!("Powering on");
        self.hard_reset()
    }

    /// Stops the CPU, clears RAM, reloads the ROMs, resets the PIA, the
    /// terminal and the CPU, then starts again. If the ROMs can't be read
    /// the machine is left exactly as it was.
    pub fn hard_reset(&self) -> Result<()> {
        let _guard = lock(&self.lifecycle);
        let images = lock(&self.roms).load()?;

        self.runner.stop();
        self.memory.reset(&images)?;
        self.memory.pia().reset();
        lock(&self.terminal).reset();
        self.keyboard.clear();
        self.runner.reset();
        self.runner.start()?;

        record_reset("hard");
        info!("Hard reset");
        Ok(())
    }

    /// Resets the PIA and the CPU between two instructions. Memory and the
    /// screen are kept.
    pub fn soft_reset(&self) {
        let _guard = lock(&self.lifecycle);
        self.runner.with_cpu(|cpu, memory| {
            memory.pia().reset();
            cpu.reset(memory);
        });
        record_reset("soft");
        info!("Soft reset");
    }

    pub fn shutdown(&self) {
        let _guard = lock(&self.lifecycle);
        self.runner.stop();
    }

    /// Points the IRQ/BRK vector at `address`. Goes through the normal write
    /// path, so a protected ROM page keeps the old vector.
    pub fn set_irq_brk_vector(&self, address: u16) {
        self.memory.write_u16(IRQ_VECTOR, address);
        info!("IRQ/BRK vector set to ${:04X}", address);
    }

    pub fn set_ram8k(&self, enabled: bool) {
        self.memory.set_ram8k(enabled);
        lock(&self.settings).ram8k = enabled;
        info!("8K RAM mode {}", if enabled { "on" } else { "off" });
    }

    pub fn set_write_in_rom(&self, enabled: bool) {
        self.memory.set_write_in_rom(enabled);
        lock(&self.settings).write_in_rom = enabled;
        info!("Writing to ROM {}", if enabled { "allowed" } else { "blocked" });
    }

    /// Takes effect at the next hard reset.
    pub fn set_krusader_rom(&self, enabled: bool) {
        lock(&self.roms).krusader = enabled;
        lock(&self.settings).krusader_rom = enabled;
        info!("Krusader ROM {}", if enabled { "selected" } else { "deselected" });
    }

    pub fn set_terminal_speed(&self, chars_per_second: u32) -> Result<()> {
        lock(&self.terminal).set_speed(chars_per_second)?;
        lock(&self.settings).terminal_speed = chars_per_second;
        Ok(())
    }

    /// Hands the next queued key to the CPU if it's ready for one.
    pub fn pump_keyboard(&self) -> bool {
        self.keyboard.pump(self.memory.pia())
    }

    /// Consumes one waiting display byte, if any.
    pub fn poll_display(&self) -> Option<Output> {
        lock(&self.terminal).poll(self.memory.pia())
    }

    pub fn output_delay(&self) -> Duration {
        lock(&self.terminal).output_delay()
    }

    pub fn cursor(&self) -> (usize, usize) {
        lock(&self.terminal).cursor()
    }

    pub fn screen_text(&self) -> String {
        lock(&self.terminal).text()
    }

    pub fn load_file(&self, path: &Path, start: u16) -> Result<usize> {
        memfile::load(&self.memory, path, start)
    }

    pub fn save_file(&self, path: &Path, start: u16, end: u16) -> Result<()> {
        memfile::save(&self.memory, path, start, end)
    }

    /// Captures registers, PIA and memory with the CPU held between
    /// instructions.
    pub fn snapshot(&self, name: String) -> MachineSnapshot {
        self.runner
            .with_cpu(|cpu, memory| MachineSnapshot::capture(name, cpu.export_state(), memory))
    }

    pub fn restore(&self, snapshot: &MachineSnapshot) -> Result<()> {
        self.runner
            .with_cpu(|cpu, memory| snapshot.restore_into(cpu, memory))?;
        info!("Restored snapshot \"{}\" ({})", snapshot.name, snapshot.id);
        Ok(())
    }
}
