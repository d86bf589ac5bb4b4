//! Loading and saving memory ranges as ASCII hex dumps or raw binary.
//!
//! The hex format is the one the Apple 1 monitor prints:
//!
//! ```text
//! // Apple 1 Save - hello.txt
//! 0280: A9 8D 20 EF FF A9 C8 20
//! : EF FF 4C 1F FF
//! ```
//!
//! A line starting with an address sets the write pointer; a line
//! starting with `:` continues from where the previous one stopped.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use log::info;

use crate::error::{EmulatorError, Result};
use crate::memory::{Memory, MEMORY_SIZE};

pub const SAVE_TITLE: &str = "Apple 1 Save";
const BYTES_PER_LINE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Hex,
    Binary,
}

impl FileFormat {
    /// `.bin` and `.rom` are binary, anything else is treated as hex.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("bin") | Some("rom") => FileFormat::Binary,
            _ => FileFormat::Hex,
        }
    }
}

/// One contiguous run of bytes parsed from a hex dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    pub address: u16,
    pub data: Vec<u8>,
}

/// Parses a whole hex dump. Nothing is written if any line is malformed.
pub fn parse_hex(text: &str) -> Result<Vec<HexRecord>> {
    let mut records: Vec<HexRecord> = Vec::new();
    let mut next_address: Option<usize> = None;

    for (index, raw) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('/') {
            continue;
        }
        let malformed = |reason: String| EmulatorError::MalformedHex { line: line_number, reason };

        let (address, rest) = match line.strip_prefix(':') {
            Some(rest) => {
                let address = next_address
                    .ok_or_else(|| malformed("continuation line before any address".to_string()))?;
                (address, rest)
            }
            None => {
                let (field, rest) = line.split_once(':').unwrap_or((line, ""));
                let field = field.trim();
                if field.is_empty() || field.len() > 4 {
                    return Err(malformed(format!("bad address \"{}\"", field)));
                }
                let address = u16::from_str_radix(field, 16)
                    .map_err(|_| malformed(format!("bad address \"{}\"", field)))?;
                (address as usize, rest)
            }
        };

        let mut data = Vec::new();
        for token in rest.split_whitespace() {
            if token.len() > 2 {
                return Err(malformed(format!("bad byte \"{}\"", token)));
            }
            let byte = u8::from_str_radix(token, 16)
                .map_err(|_| malformed(format!("bad byte \"{}\"", token)))?;
            data.push(byte);
        }
        if address + data.len() > MEMORY_SIZE {
            return Err(malformed(format!("data runs past ${:04X}", MEMORY_SIZE - 1)));
        }

        next_address = Some(address + data.len());
        if data.is_empty() {
            continue;
        }
        // Merge with the previous record when it continues it
        if let Some(last) = records
            .last_mut()
            .filter(|last| last.address as usize + last.data.len() == address)
        {
            last.data.extend_from_slice(&data);
        } else {
            records.push(HexRecord { address: address as u16, data });
        }
    }

    Ok(records)
}

/// Loads a hex dump through the normal write path, so write protection
/// applies. Returns the number of bytes written.
pub fn load_hex(memory: &Memory, path: &Path) -> Result<usize> {
    let text = fs::read_to_string(path).map_err(|e| EmulatorError::io(path, e))?;
    let records = parse_hex(&text)?;
    let mut written = 0;
    for record in &records {
        for (offset, &byte) in record.data.iter().enumerate() {
            memory.write(record.address.wrapping_add(offset as u16), byte);
        }
        written += record.data.len();
    }
    info!("Successfully loaded \"{}\" ({} bytes)", path.display(), written);
    Ok(written)
}

/// Loads a raw image at `start`, bypassing write protection.
pub fn load_binary(memory: &Memory, path: &Path, start: u16) -> Result<usize> {
    let data = fs::read(path).map_err(|e| EmulatorError::io(path, e))?;
    memory.load_image(&data, start)?;
    info!(
        "Successfully loaded \"{}\" at ${:04X} ({} bytes)",
        path.display(),
        start,
        data.len()
    );
    Ok(data.len())
}

pub fn format_hex(data: &[u8], start: u16, file_name: &str) -> String {
    let mut text = format!("// {} - {}\n", SAVE_TITLE, file_name);
    for (index, chunk) in data.chunks(BYTES_PER_LINE).enumerate() {
        let address = start as usize + index * BYTES_PER_LINE;
        let _ = write!(text, "{:04X}:", address);
        for byte in chunk {
            let _ = write!(text, " {:02X}", byte);
        }
        text.push('\n');
    }
    text
}

fn ordered(start: u16, end: u16) -> (u16, u16) {
    if start > end {
        (end, start)
    } else {
        (start, end)
    }
}

/// Saves the inclusive range as a hex dump. A reversed range is swapped.
pub fn save_hex(memory: &Memory, path: &Path, start: u16, end: u16) -> Result<()> {
    let (start, end) = ordered(start, end);
    let data = memory.snapshot(start, end)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    fs::write(path, format_hex(&data, start, &file_name)).map_err(|e| EmulatorError::io(path, e))?;
    info!("Successfully saved \"{}\"", path.display());
    Ok(())
}

pub fn save_binary(memory: &Memory, path: &Path, start: u16, end: u16) -> Result<()> {
    let (start, end) = ordered(start, end);
    let data = memory.snapshot(start, end)?;
    fs::write(path, data).map_err(|e| EmulatorError::io(path, e))?;
    info!("Successfully saved \"{}\"", path.display());
    Ok(())
}

/// Loads `path` in the format its extension implies. `start` only applies
/// to binary files.
pub fn load(memory: &Memory, path: &Path, start: u16) -> Result<usize> {
    match FileFormat::from_path(path) {
        FileFormat::Hex => load_hex(memory, path),
        FileFormat::Binary => load_binary(memory, path, start),
    }
}

pub fn save(memory: &Memory, path: &Path, start: u16, end: u16) -> Result<()> {
    match FileFormat::from_path(path) {
        FileFormat::Hex => save_hex(memory, path, start, end),
        FileFormat::Binary => save_binary(memory, path, start, end),
    }
}
