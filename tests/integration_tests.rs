use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use apple1_emulator::config::Settings;
use apple1_emulator::cpu::{CPU, IRQ_VECTOR, RESET_VECTOR};
use apple1_emulator::machine::Machine;
use apple1_emulator::memfile;
use apple1_emulator::memory::Memory;
use apple1_emulator::rom::{BASIC_FILE, BASIC_LEN, MONITOR_FILE, MONITOR_LEN};
use apple1_emulator::runner::RunController;

const BRK_HANDLER: u16 = 0x9000;

// Program at $8000; BRK lands in a JMP-to-self at $9000
fn load_program(program: &[u8]) -> (CPU, Memory) {
    let memory = Memory::new();
    memory.load_image(program, 0x8000).unwrap();
    memory.load_image(&[0x4C, 0x00, 0x90], BRK_HANDLER).unwrap();
    memory.write_u16(RESET_VECTOR, 0x8000);
    memory.write_u16(IRQ_VECTOR, BRK_HANDLER);
    let mut cpu = CPU::new();
    cpu.reset(&memory);
    (cpu, memory)
}

fn run_to_brk(cpu: &mut CPU, memory: &Memory) {
    for _ in 0..10_000 {
        if cpu.get_pc() == BRK_HANDLER {
            return;
        }
        cpu.step(memory);
    }
    panic!("program never reached BRK (pc ${:04X})", cpu.get_pc());
}

#[test]
fn test_simple_calculation() {
    // 10 + 20 + 30, stored at $50
    let (mut cpu, memory) = load_program(&[
        0x18,       // CLC
        0xA9, 0x0A, // LDA #$0A
        0x69, 0x14, // ADC #$14
        0x69, 0x1E, // ADC #$1E
        0x85, 0x50, // STA $50
        0x00,       // BRK
    ]);
    run_to_brk(&mut cpu, &memory);

    assert_eq!(cpu.get_register_a(), 60);
    assert_eq!(memory.read(0x50), 60);
}

#[test]
fn test_indexed_memory_access() {
    let (mut cpu, memory) = load_program(&[
        0xA2, 0x02, // LDX #$02
        0xB5, 0x50, // LDA $50,X
        0x95, 0x60, // STA $60,X
        0x00,       // BRK
    ]);
    memory.load_image(&[0x10, 0x20, 0x30], 0x50).unwrap();
    run_to_brk(&mut cpu, &memory);

    assert_eq!(cpu.get_register_x(), 2);
    assert_eq!(cpu.get_register_a(), 0x30);
    assert_eq!(memory.read(0x62), 0x30);
}

#[test]
fn test_block_copy_loop() {
    // Copy 16 bytes from $0300 to $0400 with a countdown loop
    let (mut cpu, memory) = load_program(&[
        0xA0, 0x0F,       // LDY #$0F
        0xB9, 0x00, 0x03, // LDA $0300,Y
        0x99, 0x00, 0x04, // STA $0400,Y
        0x88,             // DEY
        0x10, 0xF7,       // BPL -9
        0x00,             // BRK
    ]);
    let source: Vec<u8> = (0x40..0x50).collect();
    memory.load_image(&source, 0x0300).unwrap();
    run_to_brk(&mut cpu, &memory);

    assert_eq!(memory.snapshot(0x0400, 0x040F).unwrap(), source);
    assert_eq!(cpu.get_register_y(), 0xFF);
}

#[test]
fn test_decimal_counter() {
    // SED; count $0099 + 1 in BCD across two bytes
    let (mut cpu, memory) = load_program(&[
        0xF8,       // SED
        0x18,       // CLC
        0xA5, 0x20, // LDA $20
        0x69, 0x01, // ADC #$01
        0x85, 0x20, // STA $20
        0xA5, 0x21, // LDA $21
        0x69, 0x00, // ADC #$00
        0x85, 0x21, // STA $21
        0x00,       // BRK
    ]);
    memory.write(0x20, 0x99);
    run_to_brk(&mut cpu, &memory);

    assert_eq!(memory.read(0x20), 0x00);
    assert_eq!(memory.read(0x21), 0x01);
}

#[test]
fn test_hex_file_runs_on_controller() {
    let path = std::env::temp_dir().join(format!("apple1-it-{}.txt", std::process::id()));
    // INC $10; JMP $0280
    fs::write(&path, "// Apple 1 Save - counter\n0280: E6 10 4C 80 02\n").unwrap();

    let memory = Arc::new(Memory::new());
    assert_eq!(memfile::load(&memory, &path, 0).unwrap(), 5);
    fs::remove_file(&path).unwrap();
    memory.write_u16(RESET_VECTOR, 0x0280);

    let controller = RunController::new(Arc::clone(&memory));
    controller.reset();
    controller.start().unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while memory.read(0x10) == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    controller.stop();

    assert_ne!(memory.read(0x10), 0);
}

// A monitor that echoes every key to the display:
//   LDA #$A7; STA KBDCR; STA DSPCR
//   loop: LDA KBDCR; BPL loop; LDA KBD
//   wait: BIT DSP; BMI wait; STA DSP; JMP loop
const ECHO_MONITOR: [u8; 27] = [
    0xA9, 0xA7, 0x8D, 0x11, 0xD0, 0x8D, 0x13, 0xD0, 0xAD, 0x11, 0xD0, 0x10, 0xFB, 0xAD, 0x10,
    0xD0, 0x2C, 0x12, 0xD0, 0x30, 0xFB, 0x8D, 0x12, 0xD0, 0x4C, 0x08, 0xFF,
];

fn echo_rom_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("apple1-it-roms-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let mut monitor = vec![0u8; MONITOR_LEN];
    monitor[..ECHO_MONITOR.len()].copy_from_slice(&ECHO_MONITOR);
    monitor[0xFA..].copy_from_slice(&[0x00, 0xFF, 0x00, 0xFF, 0x00, 0xFF]);
    fs::write(dir.join(MONITOR_FILE), monitor).unwrap();
    fs::write(dir.join(BASIC_FILE), vec![0u8; BASIC_LEN]).unwrap();
    dir
}

#[test]
fn test_keyboard_echoes_to_screen() {
    let dir = echo_rom_dir();
    let machine = Machine::new(Settings::default(), &dir).unwrap();
    machine.power_on().unwrap();
    machine.keyboard().queue_text("hi\r");

    let deadline = Instant::now() + Duration::from_secs(2);
    while machine.cursor() != (0, 1) && Instant::now() < deadline {
        machine.pump_keyboard();
        if machine.poll_display().is_none() {
            thread::sleep(Duration::from_millis(1));
        }
    }
    machine.shutdown();
    fs::remove_dir_all(&dir).unwrap();

    assert_eq!(machine.screen_text().lines().next(), Some("HI"));
    assert_eq!(machine.cursor(), (0, 1));
    assert_eq!(machine.keyboard().pending(), 0);
}
