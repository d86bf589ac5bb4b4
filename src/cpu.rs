use crate::memory::Memory;
use crate::opcodes::{AddressingMode, Operation, OPCODES};

#[derive(Debug, Clone)]
pub struct CPU {
    // Registers (public for snapshot support)
    pub a: u8,      // Accumulator
    pub x: u8,      // X Index Register
    pub y: u8,      // Y Index Register
    pub pc: u16,    // Program Counter
    pub sp: u8,     // Stack Pointer
    pub status: u8, // Status Register

    pub cycles: u64,
}

// Status register flags
pub const CARRY_FLAG: u8 = 0x01;
pub const ZERO_FLAG: u8 = 0x02;
pub const INTERRUPT_DISABLE: u8 = 0x04;
pub const DECIMAL_MODE: u8 = 0x08;
pub const BREAK_COMMAND: u8 = 0x10;
pub const UNUSED_FLAG: u8 = 0x20;
pub const OVERFLOW_FLAG: u8 = 0x40;
pub const NEGATIVE_FLAG: u8 = 0x80;

pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

const STACK_PAGE: u16 = 0x0100;
pub const INTERRUPT_CYCLES: u32 = 7;

impl CPU {
    pub fn new() -> Self {
        CPU {
            a: 0,
            x: 0,
            y: 0,
            pc: 0,
            sp: 0xFF,
            status: UNUSED_FLAG | INTERRUPT_DISABLE,
            cycles: 0,
        }
    }

    /// Leaves A, X and Y alone, as the hardware does.
    pub fn reset(&mut self, memory: &Memory) {
        self.status |= INTERRUPT_DISABLE | UNUSED_FLAG;
        self.sp = 0xFF;
        self.pc = memory.read_u16(RESET_VECTOR);
    }

    /// Executes one instruction and returns the cycles it took.
    pub fn step(&mut self, memory: &Memory) -> u32 {
        let opcode = OPCODES[memory.read(self.pc) as usize];
        self.pc = self.pc.wrapping_add(1);

        let (address, penalty) = self.resolve(opcode.mode, memory);
        let cycles = opcode.base_cycles() + penalty + self.execute(opcode.operation, address, memory);
        self.cycles += cycles as u64;
        cycles
    }

    /// Services a maskable interrupt. The caller checks the I flag.
    pub fn irq(&mut self, memory: &Memory) -> u32 {
        self.interrupt(memory, IRQ_VECTOR)
    }

    pub fn nmi(&mut self, memory: &Memory) -> u32 {
        self.interrupt(memory, NMI_VECTOR)
    }

    fn interrupt(&mut self, memory: &Memory, vector: u16) -> u32 {
        self.push_u16(memory, self.pc);
        self.push(memory, (self.status & !BREAK_COMMAND) | UNUSED_FLAG);
        self.set_flag(INTERRUPT_DISABLE, true);
        self.pc = memory.read_u16(vector);
        self.cycles += INTERRUPT_CYCLES as u64;
        INTERRUPT_CYCLES
    }

    // Getters
    pub fn get_register_a(&self) -> u8 { self.a }
    pub fn get_register_x(&self) -> u8 { self.x }
    pub fn get_register_y(&self) -> u8 { self.y }
    pub fn get_pc(&self) -> u16 { self.pc }
    pub fn get_sp(&self) -> u8 { self.sp }
    pub fn get_status(&self) -> u8 { self.status }

    pub fn interrupts_masked(&self) -> bool {
        self.get_flag(INTERRUPT_DISABLE)
    }

    // Flag operations
    pub fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.status |= flag;
        } else {
            self.status &= !flag;
        }
    }

    pub fn get_flag(&self, flag: u8) -> bool {
        (self.status & flag) != 0
    }

    fn update_zero_and_negative_flags(&mut self, value: u8) {
        self.set_flag(ZERO_FLAG, value == 0);
        self.set_flag(NEGATIVE_FLAG, (value & 0x80) != 0);
    }

    fn push(&mut self, memory: &Memory, value: u8) {
        memory.write(STACK_PAGE | self.sp as u16, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop(&mut self, memory: &Memory) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        memory.read(STACK_PAGE | self.sp as u16)
    }

    fn push_u16(&mut self, memory: &Memory, value: u16) {
        self.push(memory, (value >> 8) as u8);
        self.push(memory, (value & 0xFF) as u8);
    }

    fn pop_u16(&mut self, memory: &Memory) -> u16 {
        let low = self.pop(memory) as u16;
        let high = self.pop(memory) as u16;
        (high << 8) | low
    }

    fn fetch_u8(&mut self, memory: &Memory) -> u8 {
        let value = memory.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        value
    }

    fn fetch_u16(&mut self, memory: &Memory) -> u16 {
        let low = self.fetch_u8(memory) as u16;
        let high = self.fetch_u8(memory) as u16;
        (high << 8) | low
    }

    // Pointer fetch that stays inside the zero page
    fn read_zero_page_u16(memory: &Memory, pointer: u8) -> u16 {
        let low = memory.read(pointer as u16) as u16;
        let high = memory.read(pointer.wrapping_add(1) as u16) as u16;
        (high << 8) | low
    }

    /// Resolves the operand address for `mode`, advancing PC past the
    /// operand bytes. Returns the address and the page-cross penalty.
    fn resolve(&mut self, mode: AddressingMode, memory: &Memory) -> (u16, u32) {
        match mode {
            AddressingMode::Implied => (0, 0),
            AddressingMode::Immediate => {
                let address = self.pc;
                self.pc = self.pc.wrapping_add(1);
                (address, 0)
            }
            AddressingMode::ZeroPage => (self.fetch_u8(memory) as u16, 0),
            AddressingMode::ZeroPageX => (self.fetch_u8(memory).wrapping_add(self.x) as u16, 0),
            AddressingMode::ZeroPageY => (self.fetch_u8(memory).wrapping_add(self.y) as u16, 0),
            AddressingMode::Absolute => (self.fetch_u16(memory), 0),
            AddressingMode::AbsoluteX => {
                let base = self.fetch_u16(memory);
                indexed(base, self.x)
            }
            AddressingMode::AbsoluteY => {
                let base = self.fetch_u16(memory);
                indexed(base, self.y)
            }
            AddressingMode::AbsoluteXWrite => {
                let base = self.fetch_u16(memory);
                (base.wrapping_add(self.x as u16), 0)
            }
            AddressingMode::AbsoluteYWrite => {
                let base = self.fetch_u16(memory);
                (base.wrapping_add(self.y as u16), 0)
            }
            AddressingMode::Indirect => {
                let pointer = self.fetch_u16(memory);
                // The high byte is fetched without carrying into the page
                let low = memory.read(pointer) as u16;
                let high = memory.read((pointer & 0xFF00) | (pointer.wrapping_add(1) & 0x00FF)) as u16;
                ((high << 8) | low, 0)
            }
            AddressingMode::IndexedIndirect => {
                let pointer = self.fetch_u8(memory).wrapping_add(self.x);
                (Self::read_zero_page_u16(memory, pointer), 0)
            }
            AddressingMode::IndirectIndexed => {
                let pointer = self.fetch_u8(memory);
                let base = Self::read_zero_page_u16(memory, pointer);
                indexed(base, self.y)
            }
            AddressingMode::IndirectIndexedWrite => {
                let pointer = self.fetch_u8(memory);
                let base = Self::read_zero_page_u16(memory, pointer);
                (base.wrapping_add(self.y as u16), 0)
            }
            AddressingMode::Relative => {
                let offset = self.fetch_u8(memory) as i8;
                (self.pc.wrapping_add(offset as i16 as u16), 0)
            }
        }
    }

    /// Runs `operation` against the resolved `address`. Returns cycles
    /// beyond the table cost (taken branches only).
    fn execute(&mut self, operation: Operation, address: u16, memory: &Memory) -> u32 {
        match operation {
            Operation::Lda => {
                self.a = memory.read(address);
                self.update_zero_and_negative_flags(self.a);
            }
            Operation::Ldx => {
                self.x = memory.read(address);
                self.update_zero_and_negative_flags(self.x);
            }
            Operation::Ldy => {
                self.y = memory.read(address);
                self.update_zero_and_negative_flags(self.y);
            }
            Operation::Sta => memory.write(address, self.a),
            Operation::Stx => memory.write(address, self.x),
            Operation::Sty => memory.write(address, self.y),

            Operation::Adc => {
                let value = memory.read(address);
                self.add_with_carry(value);
            }
            Operation::Sbc => {
                let value = memory.read(address);
                self.subtract_with_carry(value);
            }

            Operation::Cmp => self.compare(self.a, memory.read(address)),
            Operation::Cpx => self.compare(self.x, memory.read(address)),
            Operation::Cpy => self.compare(self.y, memory.read(address)),

            Operation::And => {
                self.a &= memory.read(address);
                self.update_zero_and_negative_flags(self.a);
            }
            Operation::Ora => {
                self.a |= memory.read(address);
                self.update_zero_and_negative_flags(self.a);
            }
            Operation::Eor => {
                self.a ^= memory.read(address);
                self.update_zero_and_negative_flags(self.a);
            }
            Operation::Bit => {
                let value = memory.read(address);
                self.set_flag(ZERO_FLAG, (self.a & value) == 0);
                self.set_flag(NEGATIVE_FLAG, (value & 0x80) != 0);
                self.set_flag(OVERFLOW_FLAG, (value & 0x40) != 0);
            }

            Operation::Asl | Operation::Lsr | Operation::Rol | Operation::Ror => {
                let value = memory.read(address);
                let result = self.shift(operation, value);
                memory.write(address, result);
            }
            Operation::AslA | Operation::LsrA | Operation::RolA | Operation::RorA => {
                self.a = self.shift(operation, self.a);
            }

            Operation::Inc => {
                let result = memory.read(address).wrapping_add(1);
                memory.write(address, result);
                self.update_zero_and_negative_flags(result);
            }
            Operation::Dec => {
                let result = memory.read(address).wrapping_sub(1);
                memory.write(address, result);
                self.update_zero_and_negative_flags(result);
            }
            Operation::Inx => {
                self.x = self.x.wrapping_add(1);
                self.update_zero_and_negative_flags(self.x);
            }
            Operation::Iny => {
                self.y = self.y.wrapping_add(1);
                self.update_zero_and_negative_flags(self.y);
            }
            Operation::Dex => {
                self.x = self.x.wrapping_sub(1);
                self.update_zero_and_negative_flags(self.x);
            }
            Operation::Dey => {
                self.y = self.y.wrapping_sub(1);
                self.update_zero_and_negative_flags(self.y);
            }

            Operation::Pha => self.push(memory, self.a),
            Operation::Php => self.push(memory, self.status | BREAK_COMMAND | UNUSED_FLAG),
            Operation::Pla => {
                self.a = self.pop(memory);
                self.update_zero_and_negative_flags(self.a);
            }
            Operation::Plp => {
                self.status = (self.pop(memory) & !BREAK_COMMAND) | UNUSED_FLAG;
            }

            Operation::Brk => {
                // PC already points past the padding byte
                self.push_u16(memory, self.pc);
                self.push(memory, self.status | BREAK_COMMAND | UNUSED_FLAG);
                self.set_flag(INTERRUPT_DISABLE, true);
                self.pc = memory.read_u16(IRQ_VECTOR);
            }
            Operation::Rti => {
                self.status = (self.pop(memory) & !BREAK_COMMAND) | UNUSED_FLAG;
                self.pc = self.pop_u16(memory);
            }

            Operation::Jmp => self.pc = address,
            Operation::Jsr => {
                self.push_u16(memory, self.pc.wrapping_sub(1));
                self.pc = address;
            }
            Operation::Rts => {
                self.pc = self.pop_u16(memory).wrapping_add(1);
            }

            Operation::Bpl => return self.branch(!self.get_flag(NEGATIVE_FLAG), address),
            Operation::Bmi => return self.branch(self.get_flag(NEGATIVE_FLAG), address),
            Operation::Bvc => return self.branch(!self.get_flag(OVERFLOW_FLAG), address),
            Operation::Bvs => return self.branch(self.get_flag(OVERFLOW_FLAG), address),
            Operation::Bcc => return self.branch(!self.get_flag(CARRY_FLAG), address),
            Operation::Bcs => return self.branch(self.get_flag(CARRY_FLAG), address),
            Operation::Bne => return self.branch(!self.get_flag(ZERO_FLAG), address),
            Operation::Beq => return self.branch(self.get_flag(ZERO_FLAG), address),

            Operation::Tax => {
                self.x = self.a;
                self.update_zero_and_negative_flags(self.x);
            }
            Operation::Txa => {
                self.a = self.x;
                self.update_zero_and_negative_flags(self.a);
            }
            Operation::Tay => {
                self.y = self.a;
                self.update_zero_and_negative_flags(self.y);
            }
            Operation::Tya => {
                self.a = self.y;
                self.update_zero_and_negative_flags(self.a);
            }
            Operation::Txs => self.sp = self.x,
            Operation::Tsx => {
                self.x = self.sp;
                self.update_zero_and_negative_flags(self.x);
            }

            Operation::Clc => self.set_flag(CARRY_FLAG, false),
            Operation::Sec => self.set_flag(CARRY_FLAG, true),
            Operation::Cli => self.set_flag(INTERRUPT_DISABLE, false),
            Operation::Sei => self.set_flag(INTERRUPT_DISABLE, true),
            Operation::Clv => self.set_flag(OVERFLOW_FLAG, false),
            Operation::Cld => self.set_flag(DECIMAL_MODE, false),
            Operation::Sed => self.set_flag(DECIMAL_MODE, true),

            Operation::Nop => {}
            Operation::SkipByte => self.pc = self.pc.wrapping_add(1),
            Operation::SkipWord => self.pc = self.pc.wrapping_add(2),
            // Stays on the opcode until an interrupt or reset moves PC
            Operation::Hang => self.pc = self.pc.wrapping_sub(1),
        }
        0
    }

    fn branch(&mut self, condition: bool, target: u16) -> u32 {
        if !condition {
            return 0;
        }
        let cycles = if (self.pc & 0xFF00) != (target & 0xFF00) { 2 } else { 1 };
        self.pc = target;
        cycles
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.set_flag(CARRY_FLAG, register >= value);
        self.update_zero_and_negative_flags(register.wrapping_sub(value));
    }

    fn shift(&mut self, operation: Operation, value: u8) -> u8 {
        let carry_in = self.get_flag(CARRY_FLAG) as u8;
        let (result, carry_out) = match operation {
            Operation::Asl | Operation::AslA => (value << 1, value & 0x80 != 0),
            Operation::Lsr | Operation::LsrA => (value >> 1, value & 0x01 != 0),
            Operation::Rol | Operation::RolA => ((value << 1) | carry_in, value & 0x80 != 0),
            _ => ((value >> 1) | (carry_in << 7), value & 0x01 != 0),
        };
        self.set_flag(CARRY_FLAG, carry_out);
        self.update_zero_and_negative_flags(result);
        result
    }

    fn add_binary(&mut self, value: u8) -> u8 {
        let carry = self.get_flag(CARRY_FLAG) as u16;
        let sum = self.a as u16 + value as u16 + carry;
        let result = sum as u8;
        self.set_flag(CARRY_FLAG, sum > 0xFF);
        self.set_flag(OVERFLOW_FLAG, (!(self.a ^ value) & (self.a ^ result) & 0x80) != 0);
        self.update_zero_and_negative_flags(result);
        result
    }

    fn add_with_carry(&mut self, value: u8) {
        if !self.get_flag(DECIMAL_MODE) {
            self.a = self.add_binary(value);
            return;
        }

        let a = self.a as u16;
        let m = value as u16;
        let carry = self.get_flag(CARRY_FLAG) as u16;

        // Z follows the binary sum even in decimal mode
        self.set_flag(ZERO_FLAG, (a + m + carry) & 0xFF == 0);

        let mut low = (a & 0x0F) + (m & 0x0F) + carry;
        if low >= 0x0A {
            low = ((low + 0x06) & 0x0F) + 0x10;
        }
        let mut high = (a & 0xF0) + (m & 0xF0) + low;
        // N and V come from the sum before the high nibble is corrected
        self.set_flag(NEGATIVE_FLAG, (high & 0x80) != 0);
        self.set_flag(OVERFLOW_FLAG, ((a ^ high) & !(a ^ m) & 0x80) != 0);
        if high >= 0xA0 {
            high += 0x60;
        }
        self.set_flag(CARRY_FLAG, high >= 0x100);
        self.a = (high & 0xFF) as u8;
    }

    fn subtract_with_carry(&mut self, value: u8) {
        if !self.get_flag(DECIMAL_MODE) {
            self.a = self.add_binary(!value);
            return;
        }

        let a = self.a as u16;
        let m = value as u16;
        let borrow = 1 - self.get_flag(CARRY_FLAG) as u16;

        // Flags come from the binary difference
        self.add_binary(!value);

        let mut low = (a & 0x0F).wrapping_sub(m & 0x0F).wrapping_sub(borrow);
        if low & 0x10 != 0 {
            low = low.wrapping_sub(0x06);
        }
        let mut high = (a & 0xF0).wrapping_sub(m & 0xF0).wrapping_sub(low & 0x10);
        if high & 0x100 != 0 {
            high = high.wrapping_sub(0x60);
        }
        self.a = ((low & 0x0F) | (high & 0xF0)) as u8;
    }
}

impl Default for CPU {
    fn default() -> Self {
        Self::new()
    }
}

fn indexed(base: u16, index: u8) -> (u16, u32) {
    let address = base.wrapping_add(index as u16);
    let penalty = if (base & 0xFF00) != (address & 0xFF00) { 1 } else { 0 };
    (address, penalty)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Loads `program` at $8000 and points the reset vector at it
    fn setup(program: &[u8]) -> (CPU, Memory) {
        let memory = Memory::new();
        memory.load_image(program, 0x8000).unwrap();
        memory.write_u16(RESET_VECTOR, 0x8000);
        let mut cpu = CPU::new();
        cpu.reset(&memory);
        (cpu, memory)
    }

    #[test]
    fn test_lda_immediate() {
        // LDA #$42
        let (mut cpu, memory) = setup(&[0xA9, 0x42]);
        let cycles = cpu.step(&memory);

        assert_eq!(cpu.get_register_a(), 0x42);
        assert_eq!(cpu.get_pc(), 0x8002);
        assert_eq!(cycles, 2);
        assert!(!cpu.get_flag(ZERO_FLAG));
        assert!(!cpu.get_flag(NEGATIVE_FLAG));
    }

    #[test]
    fn test_load_flags_for_every_value() {
        for value in 0..=0xFFu8 {
            // LDA #v, TAX, LDY #v
            let (mut cpu, memory) = setup(&[0xA9, value, 0xAA, 0xA0, value]);
            for _ in 0..3 {
                cpu.step(&memory);
                assert_eq!(cpu.get_flag(ZERO_FLAG), value == 0);
                assert_eq!(cpu.get_flag(NEGATIVE_FLAG), value & 0x80 != 0);
            }
            assert_eq!(cpu.get_register_x(), value);
            assert_eq!(cpu.get_register_y(), value);
        }
    }

    fn assert_nz(cpu: &CPU, value: u8) {
        assert_eq!(cpu.get_flag(ZERO_FLAG), value == 0, "Z for ${:02X}", value);
        assert_eq!(cpu.get_flag(NEGATIVE_FLAG), value & 0x80 != 0, "N for ${:02X}", value);
    }

    #[test]
    fn test_transfer_and_index_flags_for_every_value() {
        for value in 0..=0xFFu8 {
            let (mut cpu, memory) = setup(&[
                0xA2, value, // LDX #v
                0x8A,        // TXA
                0xA8,        // TAY
                0x98,        // TYA
                0xE8,        // INX
                0xCA,        // DEX
                0xCA,        // DEX
                0xC8,        // INY
                0x88,        // DEY
                0x88,        // DEY
            ]);
            for _ in 0..4 {
                cpu.step(&memory);
                assert_nz(&cpu, value);
            }
            assert_eq!(
                (cpu.get_register_a(), cpu.get_register_x(), cpu.get_register_y()),
                (value, value, value)
            );

            let steps = [value.wrapping_add(1), value, value.wrapping_sub(1)];
            for expected in steps {
                cpu.step(&memory);
                assert_eq!(cpu.get_register_x(), expected);
                assert_nz(&cpu, expected);
            }
            for expected in steps {
                cpu.step(&memory);
                assert_eq!(cpu.get_register_y(), expected);
                assert_nz(&cpu, expected);
            }
        }
    }

    #[test]
    fn test_inc_dec_memory_flags() {
        for value in 0..=0xFFu8 {
            // INC $10, DEC $11
            let (mut cpu, memory) = setup(&[0xE6, 0x10, 0xC6, 0x11]);
            memory.write(0x10, value);
            memory.write(0x11, value);

            assert_eq!(cpu.step(&memory), 5);
            let incremented = value.wrapping_add(1);
            assert_eq!(memory.read(0x10), incremented);
            assert_eq!(cpu.get_flag(ZERO_FLAG), incremented == 0);
            assert_eq!(cpu.get_flag(NEGATIVE_FLAG), incremented & 0x80 != 0);

            cpu.step(&memory);
            let decremented = value.wrapping_sub(1);
            assert_eq!(memory.read(0x11), decremented);
            assert_eq!(cpu.get_flag(ZERO_FLAG), decremented == 0);
            assert_eq!(cpu.get_flag(NEGATIVE_FLAG), decremented & 0x80 != 0);
        }
    }

    #[test]
    fn test_adc_binary_overflow() {
        // CLC, LDA #$50, ADC #$50
        let (mut cpu, memory) = setup(&[0x18, 0xA9, 0x50, 0x69, 0x50]);
        for _ in 0..3 {
            cpu.step(&memory);
        }
        assert_eq!(cpu.get_register_a(), 0xA0);
        assert!(cpu.get_flag(OVERFLOW_FLAG));
        assert!(cpu.get_flag(NEGATIVE_FLAG));
        assert!(!cpu.get_flag(CARRY_FLAG));
    }

    #[test]
    fn test_adc_sbc_match_twos_complement() {
        for a in (0..=0xFFu16).step_by(7) {
            for m in (0..=0xFFu16).step_by(5) {
                for carry in 0..=1u16 {
                    let mut cpu = CPU::new();
                    cpu.a = a as u8;
                    cpu.set_flag(CARRY_FLAG, carry == 1);
                    cpu.add_with_carry(m as u8);
                    let sum = a + m + carry;
                    let signed = (a as u8 as i8) as i16 + (m as u8 as i8) as i16 + carry as i16;
                    assert_eq!(cpu.a, sum as u8);
                    assert_eq!(cpu.get_flag(CARRY_FLAG), sum > 0xFF);
                    assert_eq!(cpu.get_flag(OVERFLOW_FLAG), !(-128..=127).contains(&signed));

                    let mut cpu = CPU::new();
                    cpu.a = a as u8;
                    cpu.set_flag(CARRY_FLAG, carry == 1);
                    cpu.subtract_with_carry(m as u8);
                    let borrow = 1 - carry;
                    let difference = (a as i16) - (m as i16) - borrow as i16;
                    let signed = (a as u8 as i8) as i16 - (m as u8 as i8) as i16 - borrow as i16;
                    assert_eq!(cpu.a, difference as u8);
                    assert_eq!(cpu.get_flag(CARRY_FLAG), difference >= 0);
                    assert_eq!(cpu.get_flag(OVERFLOW_FLAG), !(-128..=127).contains(&signed));
                }
            }
        }
    }

    #[test]
    fn test_adc_decimal() {
        // SED, SEC, LDA #$79, ADC #$00
        let (mut cpu, memory) = setup(&[0xF8, 0x38, 0xA9, 0x79, 0x69, 0x00]);
        for _ in 0..4 {
            cpu.step(&memory);
        }
        assert_eq!(cpu.get_register_a(), 0x80);
        assert!(cpu.get_flag(NEGATIVE_FLAG));
        assert!(cpu.get_flag(OVERFLOW_FLAG));
        assert!(!cpu.get_flag(CARRY_FLAG));
        assert!(!cpu.get_flag(ZERO_FLAG));
    }

    #[test]
    fn test_adc_decimal_carry_out() {
        let mut cpu = CPU::new();
        cpu.set_flag(DECIMAL_MODE, true);
        cpu.a = 0x58;
        cpu.set_flag(CARRY_FLAG, false);
        cpu.add_with_carry(0x46);
        assert_eq!(cpu.a, 0x04);
        assert!(cpu.get_flag(CARRY_FLAG));
    }

    #[test]
    fn test_sbc_decimal() {
        let mut cpu = CPU::new();
        cpu.set_flag(DECIMAL_MODE, true);
        cpu.a = 0x50;
        cpu.set_flag(CARRY_FLAG, true);
        cpu.subtract_with_carry(0x01);
        assert_eq!(cpu.a, 0x49);
        assert!(cpu.get_flag(CARRY_FLAG));

        cpu.a = 0x00;
        cpu.set_flag(CARRY_FLAG, true);
        cpu.subtract_with_carry(0x01);
        assert_eq!(cpu.a, 0x99);
        assert!(!cpu.get_flag(CARRY_FLAG));
    }

    #[test]
    fn test_sbc_borrow() {
        // SEC, LDA #$10, SBC #$20
        let (mut cpu, memory) = setup(&[0x38, 0xA9, 0x10, 0xE9, 0x20]);
        for _ in 0..3 {
            cpu.step(&memory);
        }
        assert_eq!(cpu.get_register_a(), 0xF0);
        assert!(!cpu.get_flag(CARRY_FLAG));
        assert!(cpu.get_flag(NEGATIVE_FLAG));
    }

    #[test]
    fn test_compare() {
        // LDA #$40, CMP #$40, CMP #$41, CPX #$00
        let (mut cpu, memory) = setup(&[0xA9, 0x40, 0xC9, 0x40, 0xC9, 0x41, 0xE0, 0x00]);
        cpu.step(&memory);
        cpu.step(&memory);
        assert!(cpu.get_flag(ZERO_FLAG));
        assert!(cpu.get_flag(CARRY_FLAG));

        cpu.step(&memory);
        assert!(!cpu.get_flag(ZERO_FLAG));
        assert!(!cpu.get_flag(CARRY_FLAG));
        assert!(cpu.get_flag(NEGATIVE_FLAG));

        cpu.step(&memory);
        assert!(cpu.get_flag(ZERO_FLAG));
        assert!(cpu.get_flag(CARRY_FLAG));
    }

    #[test]
    fn test_bit() {
        // LDA #$01, BIT $10
        let (mut cpu, memory) = setup(&[0xA9, 0x01, 0x24, 0x10]);
        memory.write(0x10, 0xC0);
        cpu.step(&memory);
        cpu.step(&memory);
        assert!(cpu.get_flag(ZERO_FLAG));
        assert!(cpu.get_flag(NEGATIVE_FLAG));
        assert!(cpu.get_flag(OVERFLOW_FLAG));
        assert_eq!(cpu.get_register_a(), 0x01);
    }

    #[test]
    fn test_shifts_and_rotates() {
        // SEC, LDA #$81, ROL A, ROR A, ASL A, LSR $10
        let (mut cpu, memory) = setup(&[0x38, 0xA9, 0x81, 0x2A, 0x6A, 0x0A, 0x46, 0x10]);
        memory.write(0x10, 0x01);
        cpu.step(&memory);
        cpu.step(&memory);
        cpu.step(&memory);
        assert_eq!(cpu.get_register_a(), 0x03);
        assert!(cpu.get_flag(CARRY_FLAG));

        cpu.step(&memory);
        assert_eq!(cpu.get_register_a(), 0x81);
        assert!(cpu.get_flag(CARRY_FLAG));

        cpu.step(&memory);
        assert_eq!(cpu.get_register_a(), 0x02);
        assert!(cpu.get_flag(CARRY_FLAG));

        assert_eq!(cpu.step(&memory), 5);
        assert_eq!(memory.read(0x10), 0x00);
        assert!(cpu.get_flag(ZERO_FLAG));
        assert!(cpu.get_flag(CARRY_FLAG));
    }

    #[test]
    fn test_jsr_rts() {
        // JSR $9000, NOP; RTS at $9000
        let (mut cpu, memory) = setup(&[0x20, 0x00, 0x90, 0xEA]);
        memory.write(0x9000, 0x60);
        let initial_sp = cpu.get_sp();

        assert_eq!(cpu.step(&memory), 6);
        assert_eq!(cpu.get_pc(), 0x9000);
        assert_eq!(cpu.get_sp(), initial_sp - 2);
        assert_eq!(memory.read(0x01FF), 0x80);
        assert_eq!(memory.read(0x01FE), 0x02);

        assert_eq!(cpu.step(&memory), 6);
        assert_eq!(cpu.get_pc(), 0x8003);
        assert_eq!(cpu.get_sp(), initial_sp);
    }

    #[test]
    fn test_stack_operations() {
        // LDA #$42, PHA, LDA #$00, PLA, PHP, PLP
        let (mut cpu, memory) = setup(&[0xA9, 0x42, 0x48, 0xA9, 0x00, 0x68, 0x08, 0x28]);
        cpu.step(&memory);
        assert_eq!(cpu.step(&memory), 3);
        assert_eq!(cpu.get_sp(), 0xFE);
        cpu.step(&memory);
        assert!(cpu.get_flag(ZERO_FLAG));
        assert_eq!(cpu.step(&memory), 4);
        assert_eq!(cpu.get_register_a(), 0x42);
        assert_eq!(cpu.get_sp(), 0xFF);

        let status = cpu.get_status();
        cpu.step(&memory);
        assert_eq!(memory.read(0x01FF), status | BREAK_COMMAND | UNUSED_FLAG);
        cpu.step(&memory);
        assert_eq!(cpu.get_status(), status);
        assert!(!cpu.get_flag(BREAK_COMMAND));
    }

    #[test]
    fn test_stack_pointer_wraps() {
        // LDA #$33, LDX #$00, TXS, PHA
        let (mut cpu, memory) = setup(&[0xA9, 0x33, 0xA2, 0x00, 0x9A, 0x48]);
        for _ in 0..4 {
            cpu.step(&memory);
        }
        assert_eq!(cpu.get_sp(), 0xFF);
        assert_eq!(memory.read(0x0100), 0x33);
    }

    #[test]
    fn test_branch_cycles() {
        // Not taken: BNE with Z set
        let (mut cpu, memory) = setup(&[0xA9, 0x00, 0xD0, 0x10]);
        cpu.step(&memory);
        assert_eq!(cpu.step(&memory), 2);
        assert_eq!(cpu.get_pc(), 0x8004);

        // Taken, same page
        let (mut cpu, memory) = setup(&[0xA9, 0x01, 0xD0, 0x10]);
        cpu.step(&memory);
        assert_eq!(cpu.step(&memory), 3);
        assert_eq!(cpu.get_pc(), 0x8014);

        // Taken backwards across a page
        let (mut cpu, memory) = setup(&[0xA9, 0x01, 0xD0, 0xF0]);
        cpu.step(&memory);
        assert_eq!(cpu.step(&memory), 4);
        assert_eq!(cpu.get_pc(), 0x7FF4);
    }

    #[test]
    fn test_page_cross_penalty() {
        // LDX #$01, LDA $80FF,X, STA $80FF,X
        let (mut cpu, memory) = setup(&[0xA2, 0x01, 0xBD, 0xFF, 0x80, 0x9D, 0xFF, 0x80]);
        cpu.step(&memory);
        assert_eq!(cpu.step(&memory), 5);
        assert_eq!(cpu.step(&memory), 5);

        // LDY #$01, LDA ($20),Y without crossing
        let (mut cpu, memory) = setup(&[0xA0, 0x01, 0xB1, 0x20]);
        memory.write_u16(0x20, 0x3000);
        memory.write(0x3001, 0x99);
        cpu.step(&memory);
        assert_eq!(cpu.step(&memory), 5);
        assert_eq!(cpu.get_register_a(), 0x99);
    }

    #[test]
    fn test_jmp_indirect_page_boundary_bug() {
        // JMP ($30FF): high byte comes from $3000, not $3100
        let (mut cpu, memory) = setup(&[0x6C, 0xFF, 0x30]);
        memory.write(0x30FF, 0x00);
        memory.write(0x3100, 0x50);
        memory.write(0x3000, 0x40);

        assert_eq!(cpu.step(&memory), 5);
        assert_eq!(cpu.get_pc(), 0x4000);
    }

    #[test]
    fn test_zero_page_pointer_wraps() {
        // LDX #$00, LDA ($FF,X)
        let (mut cpu, memory) = setup(&[0xA2, 0x00, 0xA1, 0xFF]);
        memory.write(0x00FF, 0x34);
        memory.write(0x0000, 0x12);
        memory.write(0x0100, 0x56);
        memory.write(0x1234, 0x77);
        cpu.step(&memory);
        cpu.step(&memory);
        assert_eq!(cpu.get_register_a(), 0x77);
    }

    #[test]
    fn test_indexed_indirect_addressing() {
        // LDX #$05, LDA ($20,X) reads the pointer at $25
        let (mut cpu, memory) = setup(&[0xA2, 0x05, 0xA1, 0x20]);
        memory.write_u16(0x25, 0x3000);
        memory.write(0x3000, 0x42);
        cpu.step(&memory);
        assert_eq!(cpu.step(&memory), 6);
        assert_eq!(cpu.get_register_a(), 0x42);
    }

    #[test]
    fn test_store_through_pia() {
        // LDA #$A7, STA $D013, LDA #$41, STA $D012
        let (mut cpu, memory) = setup(&[0xA9, 0xA7, 0x8D, 0x13, 0xD0, 0xA9, 0x41, 0x8D, 0x12, 0xD0]);
        for _ in 0..4 {
            cpu.step(&memory);
        }
        assert_eq!(memory.pia().read_display_data(), 0xC1);
    }

    #[test]
    fn test_undocumented_opcodes() {
        // SKB #$FF, SKW $FFFF, KIL
        let (mut cpu, memory) = setup(&[0x80, 0xFF, 0x0C, 0xFF, 0xFF, 0x02]);
        assert_eq!(cpu.step(&memory), 2);
        assert_eq!(cpu.get_pc(), 0x8002);
        cpu.step(&memory);
        assert_eq!(cpu.get_pc(), 0x8005);

        cpu.step(&memory);
        assert_eq!(cpu.get_pc(), 0x8005);
        cpu.step(&memory);
        assert_eq!(cpu.get_pc(), 0x8005);
    }

    #[test]
    fn test_nop_instruction() {
        let (mut cpu, memory) = setup(&[0xEA]);
        let before = cpu.clone();
        assert_eq!(cpu.step(&memory), 2);

        // Nothing should change except PC
        assert_eq!(cpu.get_register_a(), before.a);
        assert_eq!(cpu.get_register_x(), before.x);
        assert_eq!(cpu.get_register_y(), before.y);
        assert_eq!(cpu.get_status(), before.status);
        assert_eq!(cpu.get_sp(), before.sp);
        assert_eq!(cpu.get_pc(), 0x8001);
    }

    #[test]
    fn test_reset_jmp_brk_sequence() {
        let memory = Memory::new();
        // JMP $8000 at the reset target, BRK right after
        memory.load_image(&[0x4C, 0x00, 0x80, 0x00], 0x8000).unwrap();
        memory.write_u16(RESET_VECTOR, 0x8000);
        memory.write_u16(IRQ_VECTOR, 0x9000);

        let mut cpu = CPU::new();
        cpu.a = 0x12;
        cpu.set_flag(INTERRUPT_DISABLE, false);
        cpu.reset(&memory);
        assert_eq!(cpu.get_pc(), memory.read_u16(RESET_VECTOR));
        assert_eq!(cpu.get_sp(), 0xFF);
        assert!(cpu.interrupts_masked());
        assert_eq!(cpu.get_register_a(), 0x12);

        cpu.step(&memory);
        assert_eq!(cpu.get_pc(), 0x8000);

        cpu.pc = 0x8003;
        let status = cpu.get_status();
        assert_eq!(cpu.step(&memory), 7);
        assert_eq!(cpu.get_pc(), 0x9000);
        assert!(cpu.get_flag(INTERRUPT_DISABLE));
        assert_eq!(memory.read(0x01FF), 0x80);
        assert_eq!(memory.read(0x01FE), 0x05);
        assert_eq!(memory.read(0x01FD), status | BREAK_COMMAND | UNUSED_FLAG);
        assert_eq!(cpu.get_sp(), 0xFC);
    }

    #[test]
    fn test_irq_and_rti() {
        let (mut cpu, memory) = setup(&[0xEA]);
        memory.write_u16(IRQ_VECTOR, 0x9000);
        memory.write(0x9000, 0x40); // RTI
        cpu.set_flag(INTERRUPT_DISABLE, false);
        cpu.set_flag(CARRY_FLAG, true);

        assert_eq!(cpu.irq(&memory), INTERRUPT_CYCLES);
        assert_eq!(cpu.get_pc(), 0x9000);
        assert!(cpu.interrupts_masked());
        assert_eq!(memory.read(0x01FD) & BREAK_COMMAND, 0);

        assert_eq!(cpu.step(&memory), 6);
        assert_eq!(cpu.get_pc(), 0x8000);
        assert!(!cpu.interrupts_masked());
        assert!(cpu.get_flag(CARRY_FLAG));
    }

    #[test]
    fn test_nmi_vector() {
        let (mut cpu, memory) = setup(&[0xEA]);
        memory.write_u16(NMI_VECTOR, 0xA000);
        cpu.nmi(&memory);
        assert_eq!(cpu.get_pc(), 0xA000);
        assert_eq!(cpu.cycles, INTERRUPT_CYCLES as u64);
    }
}
