//! The execution thread: runs the CPU in cycle-budgeted intervals paced
//! against the wall clock, servicing interrupt lines before every fetch.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info};

use crate::cpu::CPU;
use crate::error::{EmulatorError, Result};
use crate::memory::Memory;
use crate::metrics::{record_interrupt, record_interval, set_target_frequency};
use crate::snapshots::CpuSnapshot;
use crate::sync::lock;

pub const DEFAULT_FREQUENCY_KHZ: u32 = 1000;
pub const DEFAULT_SYNC_MILLIS: u32 = 50;
/// Sleep used when an interval started behind schedule.
pub const MIN_SLEEP: Duration = Duration::from_millis(5);

/// IRQ is a level: it stays asserted until cleared. NMI is a one-shot
/// latch consumed by the first service.
#[derive(Debug, Default)]
pub struct InterruptLines {
    irq: AtomicBool,
    nmi: AtomicBool,
}

impl InterruptLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_irq(&self, level: bool) {
        self.irq.store(level, Ordering::Release);
    }

    pub fn irq(&self) -> bool {
        self.irq.load(Ordering::Acquire)
    }

    pub fn raise_nmi(&self) {
        self.nmi.store(true, Ordering::Release);
    }

    pub fn nmi_pending(&self) -> bool {
        self.nmi.load(Ordering::Acquire)
    }

    fn take_nmi(&self) -> bool {
        self.nmi.swap(false, Ordering::AcqRel)
    }
}

/// Services pending interrupts, then executes one instruction. Returns the
/// cycles spent on all of it.
pub fn execute_instruction(cpu: &mut CPU, memory: &Memory, lines: &InterruptLines) -> u32 {
    let mut cycles = 0;
    if lines.irq() && !cpu.interrupts_masked() {
        cycles += cpu.irq(memory);
        record_interrupt("irq");
    }
    if lines.take_nmi() {
        cycles += cpu.nmi(memory);
        record_interrupt("nmi");
    }
    cycles + cpu.step(memory)
}

#[derive(Debug)]
struct Pacing {
    frequency_khz: AtomicU32,
    sync_millis: AtomicU32,
}

impl Pacing {
    fn interval(&self) -> Duration {
        Duration::from_millis(self.sync_millis.load(Ordering::Relaxed) as u64)
    }

    fn cycles_before_sync(&self) -> u64 {
        self.frequency_khz.load(Ordering::Relaxed) as u64
            * self.sync_millis.load(Ordering::Relaxed) as u64
    }
}

/// Owns the CPU and the thread that drives it.
///
/// Every method takes `&self` and may be called while the thread runs.
/// CPU state is reachable from outside only under the CPU mutex, which the
/// execution thread takes once per instruction.
pub struct RunController {
    cpu: Arc<Mutex<CPU>>,
    memory: Arc<Memory>,
    lines: Arc<InterruptLines>,
    pacing: Arc<Pacing>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl RunController {
    pub fn new(memory: Arc<Memory>) -> Self {
        set_target_frequency(DEFAULT_FREQUENCY_KHZ);
        RunController {
            cpu: Arc::new(Mutex::new(CPU::new())),
            memory,
            lines: Arc::new(InterruptLines::new()),
            pacing: Arc::new(Pacing {
                frequency_khz: AtomicU32::new(DEFAULT_FREQUENCY_KHZ),
                sync_millis: AtomicU32::new(DEFAULT_SYNC_MILLIS),
            }),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        }
    }

    pub fn memory(&self) -> &Arc<Memory> {
        &self.memory
    }

    pub fn start(&self) -> Result<()> {
        let mut thread = lock(&self.thread);
        if thread.is_some() {
            return Ok(());
        }
        self.running.store(true, Ordering::Release);

        let worker = Worker {
            cpu: Arc::clone(&self.cpu),
            memory: Arc::clone(&self.memory),
            lines: Arc::clone(&self.lines),
            pacing: Arc::clone(&self.pacing),
            running: Arc::clone(&self.running),
        };
        let handle = thread::Builder::new()
            .name("apple1-cpu".to_string())
            .spawn(move || worker.run())
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                EmulatorError::Spawn(e)
            })?;
        *thread = Some(handle);
        info!("Execution thread started");
        Ok(())
    }

    /// Clears the running flag and joins the thread.
    pub fn stop(&self) {
        let handle = lock(&self.thread).take();
        self.running.store(false, Ordering::Release);
        if let Some(handle) = handle {
            handle.thread().unpark();
            if handle.join().is_err() {
                error!("Execution thread panicked");
            }
            info!("Execution thread stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && lock(&self.thread).is_some()
    }

    /// CPU reset: sets I, reloads SP and PC from the reset vector.
    pub fn reset(&self) {
        lock(&self.cpu).reset(&self.memory);
    }

    pub fn set_speed(&self, frequency_khz: u32, sync_millis: u32) -> Result<()> {
        if frequency_khz == 0 {
            return Err(EmulatorError::InvalidSetting {
                name: "frequency_khz",
                value: frequency_khz.to_string(),
            });
        }
        if sync_millis == 0 {
            return Err(EmulatorError::InvalidSetting {
                name: "sync_millis",
                value: sync_millis.to_string(),
            });
        }
        self.pacing.frequency_khz.store(frequency_khz, Ordering::Relaxed);
        self.pacing.sync_millis.store(sync_millis, Ordering::Relaxed);
        set_target_frequency(frequency_khz);
        info!(
            "Speed set to {} kHz, synchronizing every {} ms",
            frequency_khz, sync_millis
        );
        Ok(())
    }

    pub fn speed(&self) -> (u32, u32) {
        (
            self.pacing.frequency_khz.load(Ordering::Relaxed),
            self.pacing.sync_millis.load(Ordering::Relaxed),
        )
    }

    pub fn cycles_before_sync(&self) -> u64 {
        self.pacing.cycles_before_sync()
    }

    pub fn raise_irq(&self, level: bool) {
        debug!("IRQ line {}", if level { "asserted" } else { "cleared" });
        self.lines.set_irq(level);
    }

    pub fn raise_nmi(&self) {
        debug!("NMI raised");
        self.lines.raise_nmi();
    }

    pub fn interrupt_lines(&self) -> &InterruptLines {
        &self.lines
    }

    pub fn cpu_state(&self) -> CpuSnapshot {
        lock(&self.cpu).export_state()
    }

    pub fn total_cycles(&self) -> u64 {
        lock(&self.cpu).cycles
    }

    /// Runs `f` with the CPU locked, so the execution thread is held
    /// between instructions for the duration.
    pub fn with_cpu<R>(&self, f: impl FnOnce(&mut CPU, &Memory) -> R) -> R {
        let mut cpu = lock(&self.cpu);
        f(&mut cpu, &self.memory)
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    cpu: Arc<Mutex<CPU>>,
    memory: Arc<Memory>,
    lines: Arc<InterruptLines>,
    pacing: Arc<Pacing>,
    running: Arc<AtomicBool>,
}

impl Worker {
    fn run(self) {
        let mut last_sync = Instant::now();
        while self.running.load(Ordering::Acquire) {
            let late = self.synchronize(last_sync);
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            last_sync = Instant::now();

            let budget = self.pacing.cycles_before_sync();
            let mut cycles = 0u64;
            let mut instructions = 0u64;
            while cycles < budget && self.running.load(Ordering::Relaxed) {
                let mut cpu = lock(&self.cpu);
                cycles += execute_instruction(&mut cpu, &self.memory, &self.lines) as u64;
                instructions += 1;
            }
            record_interval(instructions, cycles, late);
        }
    }

    /// Sleeps out the rest of the interval. Returns true if the previous
    /// interval overran.
    fn synchronize(&self, last_sync: Instant) -> bool {
        let interval = self.pacing.interval();
        let elapsed = last_sync.elapsed();
        let (delay, late) = match interval.checked_sub(elapsed) {
            Some(remaining) if !remaining.is_zero() => (remaining, false),
            _ => {
                debug!("Emulation behind schedule by {:?}", elapsed - interval);
                (MIN_SLEEP, true)
            }
        };
        // stop() unparks us, so a long interval doesn't delay shutdown.
        // Any other wakeup goes back to sleep until the deadline.
        let deadline = Instant::now() + delay;
        loop {
            let now = Instant::now();
            if now >= deadline || !self.running.load(Ordering::Acquire) {
                break;
            }
            thread::park_timeout(deadline - now);
        }
        late
    }
}
