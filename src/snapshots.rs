use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::cpu::{CPU, UNUSED_FLAG};
use crate::error::{EmulatorError, Result};
use crate::memory::{Memory, MEMORY_SIZE};
use crate::pia::PiaSnapshot;

/// The programmer-visible CPU registers, named rather than positional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub pc: u16,
    pub status: u8,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
}

/// A full save state: registers, PIA and the 64KB image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub cpu_state: CpuSnapshot,
    pub pia_state: PiaSnapshot,
    /// Run-length compressed memory image
    pub memory_dump: Vec<u8>,
    pub compression_ratio: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub pc: u16,
    pub size_bytes: u64,
}

pub type SnapshotStore = Arc<Mutex<HashMap<String, MachineSnapshot>>>;

pub fn new_store() -> SnapshotStore {
    Arc::new(Mutex::new(HashMap::new()))
}

impl MachineSnapshot {
    pub fn capture(name: String, cpu_state: CpuSnapshot, memory: &Memory) -> Self {
        let image = memory.dump();
        let memory_dump = compress_memory(&image);
        let compression_ratio = memory_dump.len() as f32 / image.len() as f32;

        Self {
            id: Uuid::new_v4().to_string(),
            name,
            created_at: Utc::now(),
            cpu_state,
            pia_state: memory.pia().snapshot(),
            memory_dump,
            compression_ratio,
        }
    }

    /// The decompressed 64KB image.
    pub fn memory_image(&self) -> Result<Vec<u8>> {
        decompress_memory(&self.memory_dump)
    }

    /// Writes memory (bypassing protection) and the PIA, then the CPU.
    pub fn restore_into(&self, cpu: &mut CPU, memory: &Memory) -> Result<()> {
        let image = self.memory_image()?;
        memory.load_image(&image, 0)?;
        memory.pia().restore(&self.pia_state);
        cpu.import_state(&self.cpu_state);
        Ok(())
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            pc: self.cpu_state.pc,
            size_bytes: self.memory_dump.len() as u64,
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| EmulatorError::Snapshot(e.to_string()))?;
        fs::write(path, json).map_err(|e| EmulatorError::io(path, e))
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| EmulatorError::io(path, e))?;
        let snapshot: Self =
            serde_json::from_str(&json).map_err(|e| EmulatorError::Snapshot(e.to_string()))?;
        // Catch a corrupt image before anything gets restored
        snapshot.memory_image()?;
        Ok(snapshot)
    }
}

// Simple run-length encoding for memory compression
fn compress_memory(memory: &[u8]) -> Vec<u8> {
    let mut compressed = Vec::new();
    let mut i = 0;

    while i < memory.len() {
        let current_byte = memory[i];
        let mut count = 1;

        // Count consecutive identical bytes (max 255)
        while i + count < memory.len() && memory[i + count] == current_byte && count < 255 {
            count += 1;
        }

        if count > 3 || current_byte == 0 {
            // RLE marker, count, value
            compressed.extend_from_slice(&[0xFF, count as u8, current_byte]);
        } else {
            for _ in 0..count {
                if current_byte == 0xFF {
                    // Escaped literal 0xFF
                    compressed.extend_from_slice(&[0xFF, 0x00]);
                } else {
                    compressed.push(current_byte);
                }
            }
        }

        i += count;
    }

    compressed
}

fn decompress_memory(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decompressed = Vec::with_capacity(MEMORY_SIZE);
    let mut i = 0;

    while i < compressed.len() {
        if compressed[i] != 0xFF {
            decompressed.push(compressed[i]);
            i += 1;
            continue;
        }
        match (compressed.get(i + 1), compressed.get(i + 2)) {
            (Some(0x00), _) => {
                decompressed.push(0xFF);
                i += 2;
            }
            (Some(&count), Some(&value)) => {
                decompressed.extend(std::iter::repeat(value).take(count as usize));
                i += 3;
            }
            _ => return Err(EmulatorError::Snapshot("truncated RLE sequence".to_string())),
        }
    }

    if decompressed.len() != MEMORY_SIZE {
        return Err(EmulatorError::Snapshot(format!(
            "decompressed size {} != {}",
            decompressed.len(),
            MEMORY_SIZE
        )));
    }

    Ok(decompressed)
}

// Extensions to CPU for snapshot support
impl CPU {
    pub fn export_state(&self) -> CpuSnapshot {
        CpuSnapshot {
            pc: self.pc,
            status: self.status,
            a: self.a,
            x: self.x,
            y: self.y,
            sp: self.sp,
        }
    }

    pub fn import_state(&mut self, state: &CpuSnapshot) {
        self.pc = state.pc;
        self.status = state.status | UNUSED_FLAG;
        self.a = state.a;
        self.x = state.x;
        self.y = state.y;
        self.sp = state.sp;
    }
}
