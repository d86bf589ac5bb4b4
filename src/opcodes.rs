//! 256-entry decode table mapping each opcode byte to an addressing mode
//! and an operation.
//!
//! Every byte decodes to something: the NMOS undocumented opcodes are
//! folded into four classes (plain no-op, no-op skipping one or two operand
//! bytes, and the "KIL" lock-up that leaves the program counter on the
//! opcode).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Implied,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndexedIndirect,
    IndirectIndexed,
    Relative,
    /// Absolute,X for stores and read-modify-write: the index cycle is
    /// always spent.
    AbsoluteXWrite,
    AbsoluteYWrite,
    IndirectIndexedWrite,
}

impl AddressingMode {
    /// Cycles spent resolving the operand, before any page-cross penalty.
    pub const fn cycles(self) -> u32 {
        match self {
            AddressingMode::Immediate => 0,
            AddressingMode::Implied
            | AddressingMode::ZeroPage
            | AddressingMode::Relative => 1,
            AddressingMode::ZeroPageX
            | AddressingMode::ZeroPageY
            | AddressingMode::Absolute
            | AddressingMode::AbsoluteX
            | AddressingMode::AbsoluteY => 2,
            AddressingMode::IndirectIndexed
            | AddressingMode::AbsoluteXWrite
            | AddressingMode::AbsoluteYWrite => 3,
            AddressingMode::Indirect
            | AddressingMode::IndexedIndirect
            | AddressingMode::IndirectIndexedWrite => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Lda, Ldx, Ldy,
    Sta, Stx, Sty,
    Adc, Sbc,
    Cmp, Cpx, Cpy,
    And, Ora, Eor,
    Bit,
    Asl, Lsr, Rol, Ror,
    AslA, LsrA, RolA, RorA,
    Inc, Dec, Inx, Iny, Dex, Dey,
    Pha, Php, Pla, Plp,
    Brk, Rti,
    Jmp, Jsr, Rts,
    Bpl, Bmi, Bvc, Bvs, Bcc, Bcs, Bne, Beq,
    Tax, Txa, Tay, Tya, Txs, Tsx,
    Clc, Sec, Cli, Sei, Clv, Cld, Sed,
    Nop,
    // Undocumented
    SkipByte,
    SkipWord,
    Hang,
}

impl Operation {
    /// Cycles spent by the operation itself.
    pub const fn cycles(self) -> u32 {
        use Operation::*;
        match self {
            Asl | Lsr | Rol | Ror | Inc | Dec | Jsr => 3,
            Rts | Rti => 4,
            Brk => 6,
            Pla | Plp => 2,
            Lda | Ldx | Ldy | Sta | Stx | Sty | Adc | Sbc | Cmp | Cpx | Cpy | And | Ora
            | Eor | Bit | Pha | Php => 1,
            _ => 0,
        }
    }

    #[cfg(test)]
    pub const fn mnemonic(self) -> &'static str {
        use Operation::*;
        match self {
            Lda => "LDA", Ldx => "LDX", Ldy => "LDY",
            Sta => "STA", Stx => "STX", Sty => "STY",
            Adc => "ADC", Sbc => "SBC",
            Cmp => "CMP", Cpx => "CPX", Cpy => "CPY",
            And => "AND", Ora => "ORA", Eor => "EOR",
            Bit => "BIT",
            Asl | AslA => "ASL", Lsr | LsrA => "LSR", Rol | RolA => "ROL", Ror | RorA => "ROR",
            Inc => "INC", Dec => "DEC", Inx => "INX", Iny => "INY", Dex => "DEX", Dey => "DEY",
            Pha => "PHA", Php => "PHP", Pla => "PLA", Plp => "PLP",
            Brk => "BRK", Rti => "RTI",
            Jmp => "JMP", Jsr => "JSR", Rts => "RTS",
            Bpl => "BPL", Bmi => "BMI", Bvc => "BVC", Bvs => "BVS",
            Bcc => "BCC", Bcs => "BCS", Bne => "BNE", Beq => "BEQ",
            Tax => "TAX", Txa => "TXA", Tay => "TAY", Tya => "TYA", Txs => "TXS", Tsx => "TSX",
            Clc => "CLC", Sec => "SEC", Cli => "CLI", Sei => "SEI", Clv => "CLV", Cld => "CLD",
            Sed => "SED",
            Nop | SkipByte | SkipWord => "NOP",
            Hang => "KIL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub mode: AddressingMode,
    pub operation: Operation,
}

impl Opcode {
    const fn new(mode: AddressingMode, operation: Operation) -> Self {
        Opcode { mode, operation }
    }

    /// Base cost of the instruction, opcode fetch included.
    pub const fn base_cycles(&self) -> u32 {
        1 + self.mode.cycles() + self.operation.cycles()
    }
}

pub static OPCODES: [Opcode; 256] = build_table();

const fn build_table() -> [Opcode; 256] {
    let mut table = [Opcode::new(AddressingMode::Implied, Operation::Nop); 256];
    let mut i = 0;
    while i < 256 {
        table[i] = decode(i as u8);
        i += 1;
    }
    table
}

const fn decode(opcode: u8) -> Opcode {
    use AddressingMode::*;
    use Operation::*;
    let (mode, operation) = match opcode {
        0xA9 => (Immediate, Lda),
        0xA5 => (ZeroPage, Lda),
        0xB5 => (ZeroPageX, Lda),
        0xAD => (Absolute, Lda),
        0xBD => (AbsoluteX, Lda),
        0xB9 => (AbsoluteY, Lda),
        0xA1 => (IndexedIndirect, Lda),
        0xB1 => (IndirectIndexed, Lda),

        0xA2 => (Immediate, Ldx),
        0xA6 => (ZeroPage, Ldx),
        0xB6 => (ZeroPageY, Ldx),
        0xAE => (Absolute, Ldx),
        0xBE => (AbsoluteY, Ldx),

        0xA0 => (Immediate, Ldy),
        0xA4 => (ZeroPage, Ldy),
        0xB4 => (ZeroPageX, Ldy),
        0xAC => (Absolute, Ldy),
        0xBC => (AbsoluteX, Ldy),

        0x85 => (ZeroPage, Sta),
        0x95 => (ZeroPageX, Sta),
        0x8D => (Absolute, Sta),
        0x9D => (AbsoluteXWrite, Sta),
        0x99 => (AbsoluteYWrite, Sta),
        0x81 => (IndexedIndirect, Sta),
        0x91 => (IndirectIndexedWrite, Sta),

        0x86 => (ZeroPage, Stx),
        0x96 => (ZeroPageY, Stx),
        0x8E => (Absolute, Stx),

        0x84 => (ZeroPage, Sty),
        0x94 => (ZeroPageX, Sty),
        0x8C => (Absolute, Sty),

        0x69 => (Immediate, Adc),
        0x65 => (ZeroPage, Adc),
        0x75 => (ZeroPageX, Adc),
        0x6D => (Absolute, Adc),
        0x7D => (AbsoluteX, Adc),
        0x79 => (AbsoluteY, Adc),
        0x61 => (IndexedIndirect, Adc),
        0x71 => (IndirectIndexed, Adc),

        0xE9 | 0xEB => (Immediate, Sbc),
        0xE5 => (ZeroPage, Sbc),
        0xF5 => (ZeroPageX, Sbc),
        0xED => (Absolute, Sbc),
        0xFD => (AbsoluteX, Sbc),
        0xF9 => (AbsoluteY, Sbc),
        0xE1 => (IndexedIndirect, Sbc),
        0xF1 => (IndirectIndexed, Sbc),

        0xC9 => (Immediate, Cmp),
        0xC5 => (ZeroPage, Cmp),
        0xD5 => (ZeroPageX, Cmp),
        0xCD => (Absolute, Cmp),
        0xDD => (AbsoluteX, Cmp),
        0xD9 => (AbsoluteY, Cmp),
        0xC1 => (IndexedIndirect, Cmp),
        0xD1 => (IndirectIndexed, Cmp),

        0xE0 => (Immediate, Cpx),
        0xE4 => (ZeroPage, Cpx),
        0xEC => (Absolute, Cpx),

        0xC0 => (Immediate, Cpy),
        0xC4 => (ZeroPage, Cpy),
        0xCC => (Absolute, Cpy),

        0x29 | 0x0B | 0x2B => (Immediate, And),
        0x25 => (ZeroPage, And),
        0x35 => (ZeroPageX, And),
        0x2D => (Absolute, And),
        0x3D => (AbsoluteX, And),
        0x39 => (AbsoluteY, And),
        0x21 => (IndexedIndirect, And),
        0x31 => (IndirectIndexed, And),

        0x09 => (Immediate, Ora),
        0x05 => (ZeroPage, Ora),
        0x15 => (ZeroPageX, Ora),
        0x0D => (Absolute, Ora),
        0x1D => (AbsoluteX, Ora),
        0x19 => (AbsoluteY, Ora),
        0x01 => (IndexedIndirect, Ora),
        0x11 => (IndirectIndexed, Ora),

        0x49 => (Immediate, Eor),
        0x45 => (ZeroPage, Eor),
        0x55 => (ZeroPageX, Eor),
        0x4D => (Absolute, Eor),
        0x5D => (AbsoluteX, Eor),
        0x59 => (AbsoluteY, Eor),
        0x41 => (IndexedIndirect, Eor),
        0x51 => (IndirectIndexed, Eor),

        0x24 => (ZeroPage, Bit),
        0x2C => (Absolute, Bit),

        0x0A => (Implied, AslA),
        0x06 => (ZeroPage, Asl),
        0x16 => (ZeroPageX, Asl),
        0x0E => (Absolute, Asl),
        0x1E => (AbsoluteXWrite, Asl),

        0x4A => (Implied, LsrA),
        0x46 => (ZeroPage, Lsr),
        0x56 => (ZeroPageX, Lsr),
        0x4E => (Absolute, Lsr),
        0x5E => (AbsoluteXWrite, Lsr),

        0x2A => (Implied, RolA),
        0x26 => (ZeroPage, Rol),
        0x36 => (ZeroPageX, Rol),
        0x2E => (Absolute, Rol),
        0x3E => (AbsoluteXWrite, Rol),

        0x6A => (Implied, RorA),
        0x66 => (ZeroPage, Ror),
        0x76 => (ZeroPageX, Ror),
        0x6E => (Absolute, Ror),
        0x7E => (AbsoluteXWrite, Ror),

        0xE6 => (ZeroPage, Inc),
        0xF6 => (ZeroPageX, Inc),
        0xEE => (Absolute, Inc),
        0xFE => (AbsoluteXWrite, Inc),

        0xC6 => (ZeroPage, Dec),
        0xD6 => (ZeroPageX, Dec),
        0xCE => (Absolute, Dec),
        0xDE => (AbsoluteXWrite, Dec),

        0xE8 => (Implied, Inx),
        0xC8 => (Implied, Iny),
        0xCA => (Implied, Dex),
        0x88 => (Implied, Dey),

        0x48 => (Implied, Pha),
        0x08 => (Implied, Php),
        0x68 => (Implied, Pla),
        0x28 => (Implied, Plp),

        // BRK carries a padding byte
        0x00 => (Immediate, Brk),
        0x40 => (Implied, Rti),

        0x4C => (Absolute, Jmp),
        0x6C => (Indirect, Jmp),
        0x20 => (Absolute, Jsr),
        0x60 => (Implied, Rts),

        0x10 => (Relative, Bpl),
        0x30 => (Relative, Bmi),
        0x50 => (Relative, Bvc),
        0x70 => (Relative, Bvs),
        0x90 => (Relative, Bcc),
        0xB0 => (Relative, Bcs),
        0xD0 => (Relative, Bne),
        0xF0 => (Relative, Beq),

        0xAA => (Implied, Tax),
        0x8A => (Implied, Txa),
        0xA8 => (Implied, Tay),
        0x98 => (Implied, Tya),
        0x9A => (Implied, Txs),
        0xBA => (Implied, Tsx),

        0x18 => (Implied, Clc),
        0x38 => (Implied, Sec),
        0x58 => (Implied, Cli),
        0x78 => (Implied, Sei),
        0xB8 => (Implied, Clv),
        0xD8 => (Implied, Cld),
        0xF8 => (Implied, Sed),

        0x02 | 0x12 | 0x22 | 0x32 | 0x42 | 0x52 | 0x62 | 0x72 | 0x92 | 0xB2 | 0xD2 | 0xF2 => {
            (Implied, Hang)
        }
        0x04 | 0x14 | 0x34 | 0x44 | 0x54 | 0x64 | 0x74 | 0x80 | 0x82 | 0x89 | 0xC2 | 0xD4
        | 0xE2 | 0xF4 => (Implied, SkipByte),
        0x0C | 0x1C | 0x3C | 0x5C | 0x7C | 0xDC | 0xFC => (Implied, SkipWord),

        _ => (Implied, Nop),
    };
    Opcode::new(mode, operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_base_cycles() {
        let expected: &[(u8, u32)] = &[
            (0xA9, 2), (0xA5, 3), (0xB5, 4), (0xAD, 4), (0xBD, 4), (0xA1, 6), (0xB1, 5),
            (0x9D, 5), (0x99, 5), (0x91, 6), (0x81, 6),
            (0xE6, 5), (0xF6, 6), (0xEE, 6), (0xFE, 7), (0x0A, 2),
            (0x48, 3), (0x08, 3), (0x68, 4), (0x28, 4),
            (0x00, 7), (0x40, 6), (0x20, 6), (0x60, 6), (0x4C, 3), (0x6C, 5),
            (0xD0, 2), (0xAA, 2), (0xEA, 2), (0x24, 3), (0x2C, 4),
        ];
        for &(byte, cycles) in expected {
            assert_eq!(OPCODES[byte as usize].base_cycles(), cycles, "opcode ${:02X}", byte);
        }
    }

    #[test]
    fn test_undocumented_classes() {
        assert_eq!(OPCODES[0x02].operation, Operation::Hang);
        assert_eq!(OPCODES[0xF2].operation, Operation::Hang);
        assert_eq!(OPCODES[0x80].operation, Operation::SkipByte);
        assert_eq!(OPCODES[0xFC].operation, Operation::SkipWord);
        assert_eq!(OPCODES[0x1A].operation, Operation::Nop);
        assert_eq!(OPCODES[0xEB], OPCODES[0xE9]);
        assert_eq!(OPCODES[0x0B], OPCODES[0x29]);
    }

    #[test]
    fn test_documented_opcode_count() {
        let undocumented = [Operation::Hang, Operation::SkipByte, Operation::SkipWord];
        let nop_count = OPCODES
            .iter()
            .filter(|op| op.operation == Operation::Nop)
            .count();
        let documented = OPCODES
            .iter()
            .filter(|op| !undocumented.contains(&op.operation) && op.operation != Operation::Nop)
            .count();
        // 150 documented non-NOP entries plus the three immediate aliases
        assert_eq!(documented, 153);
        assert!(nop_count > 1);
        assert_eq!(OPCODES[0xEA].operation.mnemonic(), "NOP");
    }
}
