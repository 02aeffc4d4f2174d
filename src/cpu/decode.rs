//! MRISC32 instruction decoder.
//!
//! Turns a 32-bit instruction word into a uniform micro-op descriptor that
//! the execution loop can drive without caring about encoding classes.
//!
//! # Encoding classes
//!
//! - **A**: three-register form (top 6 bits zero, not a two-operand word).
//!   EX op in the low 7 bits, packed mode in bits 7-8, vector mode in
//!   bits 14-15.
//! - **B**: two-operand form (`iword & 0xfc00007c == 0x0000007c`). EX op is
//!   built from bits 8-13 and 0-6.
//! - **C**: register + 15-bit immediate. EX op is the top-6 opcode.
//! - **D**: register + 21-bit immediate (top 3 bits = 110): j/jl, ldwpc,
//!   stwpc, addpc/addpchi/ldi.
//! - **E**: conditional branches (top 6 bits = 110111), with the condition
//!   in bits 18-20.
//!
//! Branches are evaluated here; the descriptor carries the resolved
//! `next_pc`.

use super::{REG_LR, REG_PC, REG_Z};

/// Packed (SIMD) operation mode: the low two mode bits of class A/B words.
///
/// For most operations this selects the lane width. The bitwise group and
/// SEL instead use the raw value to select an operand-negation variant, and
/// the AGU uses it as an index scale shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackedMode {
    /// One 32-bit lane.
    #[default]
    None = 0,
    /// Four 8-bit lanes.
    Byte = 1,
    /// Two 16-bit lanes.
    HalfWord = 2,
    /// Reserved width; treated as 32-bit by lane-width operations.
    Reserved = 3,
}

impl PackedMode {
    /// Decode from the two mode bits.
    #[inline]
    pub fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            1 => PackedMode::Byte,
            2 => PackedMode::HalfWord,
            3 => PackedMode::Reserved,
            _ => PackedMode::None,
        }
    }

    /// The raw two-bit field value.
    #[inline]
    pub fn bits(self) -> u32 {
        self as u32
    }

    /// Index scale factor for the AGU (1, 2, 4 or 8).
    #[inline]
    pub fn index_scale(self) -> u32 {
        1 << self.bits()
    }
}

/// EX-stage operation.
///
/// Discriminants are the architectural opcode values: the low-7-bit field
/// for register forms (also reachable through class C/D encodings), and the
/// extended `(hi << 8) | lo` value for two-operand class B forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ExOp {
    Ldi = 0x01,
    AddPc = 0x02,
    AddPcHi = 0x03,

    And = 0x10,
    Or = 0x11,
    Xor = 0x12,
    Ebf = 0x13,
    Ebfu = 0x14,
    Mkbf = 0x15,

    Add = 0x16,
    Sub = 0x17,
    Min = 0x18,
    Max = 0x19,
    Minu = 0x1a,
    Maxu = 0x1b,

    Seq = 0x1c,
    Sne = 0x1d,
    Slt = 0x1e,
    Sltu = 0x1f,
    Sle = 0x20,
    Sleu = 0x21,

    Shuf = 0x22,
    Xchgsr = 0x24,

    Mul = 0x27,
    Div = 0x28,
    Divu = 0x29,
    Rem = 0x2a,
    Remu = 0x2b,

    Madd = 0x2c,
    Sel = 0x2e,
    Ibf = 0x2f,

    Mulhi = 0x30,
    Mulhiu = 0x31,
    Mulq = 0x32,
    Mulqr = 0x33,

    Pack = 0x3a,
    Packs = 0x3b,
    Packsu = 0x3c,
    PackHi = 0x3d,
    PackHiR = 0x3e,
    PackHiUr = 0x3f,

    FMin = 0x40,
    FMax = 0x41,
    FSeq = 0x42,
    FSne = 0x43,
    FSlt = 0x44,
    FSle = 0x45,
    FSunord = 0x46,
    FSord = 0x47,

    Itof = 0x48,
    Utof = 0x49,
    Ftoi = 0x4a,
    Ftou = 0x4b,
    Ftoir = 0x4c,
    Ftour = 0x4d,
    FPack = 0x4e,

    FAdd = 0x50,
    FSub = 0x51,
    FMul = 0x52,
    FDiv = 0x53,

    Adds = 0x60,
    Addsu = 0x61,
    Addh = 0x62,
    Addhu = 0x63,
    Addhr = 0x64,
    Addhur = 0x65,
    Subs = 0x66,
    Subsu = 0x67,
    Subh = 0x68,
    Subhu = 0x69,
    Subhr = 0x6a,
    Subhur = 0x6b,

    // Two-operand class B operations.
    Rev = 0x007c,
    Clz = 0x017c,
    Popcnt = 0x027c,

    FUnpl = 0x007d,
    FUnph = 0x017d,
    FSqrt = 0x087d,

    Sync = 0x007e,
    Cctrl = 0x017e,
    Crc32c = 0x027e,
    Crc32 = 0x037e,

    Wait = 0x037f,
}

impl ExOp {
    /// Map a raw opcode value to an operation.
    ///
    /// Reserved values decode as OR rather than trapping.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0x01 => ExOp::Ldi,
            0x02 => ExOp::AddPc,
            0x03 => ExOp::AddPcHi,
            0x10 => ExOp::And,
            0x11 => ExOp::Or,
            0x12 => ExOp::Xor,
            0x13 => ExOp::Ebf,
            0x14 => ExOp::Ebfu,
            0x15 => ExOp::Mkbf,
            0x16 => ExOp::Add,
            0x17 => ExOp::Sub,
            0x18 => ExOp::Min,
            0x19 => ExOp::Max,
            0x1a => ExOp::Minu,
            0x1b => ExOp::Maxu,
            0x1c => ExOp::Seq,
            0x1d => ExOp::Sne,
            0x1e => ExOp::Slt,
            0x1f => ExOp::Sltu,
            0x20 => ExOp::Sle,
            0x21 => ExOp::Sleu,
            0x22 => ExOp::Shuf,
            0x24 => ExOp::Xchgsr,
            0x27 => ExOp::Mul,
            0x28 => ExOp::Div,
            0x29 => ExOp::Divu,
            0x2a => ExOp::Rem,
            0x2b => ExOp::Remu,
            0x2c => ExOp::Madd,
            0x2e => ExOp::Sel,
            0x2f => ExOp::Ibf,
            0x30 => ExOp::Mulhi,
            0x31 => ExOp::Mulhiu,
            0x32 => ExOp::Mulq,
            0x33 => ExOp::Mulqr,
            0x3a => ExOp::Pack,
            0x3b => ExOp::Packs,
            0x3c => ExOp::Packsu,
            0x3d => ExOp::PackHi,
            0x3e => ExOp::PackHiR,
            0x3f => ExOp::PackHiUr,
            0x40 => ExOp::FMin,
            0x41 => ExOp::FMax,
            0x42 => ExOp::FSeq,
            0x43 => ExOp::FSne,
            0x44 => ExOp::FSlt,
            0x45 => ExOp::FSle,
            0x46 => ExOp::FSunord,
            0x47 => ExOp::FSord,
            0x48 => ExOp::Itof,
            0x49 => ExOp::Utof,
            0x4a => ExOp::Ftoi,
            0x4b => ExOp::Ftou,
            0x4c => ExOp::Ftoir,
            0x4d => ExOp::Ftour,
            0x4e => ExOp::FPack,
            0x50 => ExOp::FAdd,
            0x51 => ExOp::FSub,
            0x52 => ExOp::FMul,
            0x53 => ExOp::FDiv,
            0x60 => ExOp::Adds,
            0x61 => ExOp::Addsu,
            0x62 => ExOp::Addh,
            0x63 => ExOp::Addhu,
            0x64 => ExOp::Addhr,
            0x65 => ExOp::Addhur,
            0x66 => ExOp::Subs,
            0x67 => ExOp::Subsu,
            0x68 => ExOp::Subh,
            0x69 => ExOp::Subhu,
            0x6a => ExOp::Subhr,
            0x6b => ExOp::Subhur,
            0x007c => ExOp::Rev,
            0x017c => ExOp::Clz,
            0x027c => ExOp::Popcnt,
            0x007d => ExOp::FUnpl,
            0x017d => ExOp::FUnph,
            0x087d => ExOp::FSqrt,
            0x007e => ExOp::Sync,
            0x017e => ExOp::Cctrl,
            0x027e => ExOp::Crc32c,
            0x037e => ExOp::Crc32,
            0x037f => ExOp::Wait,
            _ => ExOp::Or,
        }
    }
}

/// Memory operation selected by a load/store encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemOp {
    #[default]
    None,
    /// Sign-extending byte load.
    Load8,
    /// Sign-extending half-word load.
    Load16,
    Load32,
    /// Zero-extending byte load.
    LoadU8,
    /// Zero-extending half-word load.
    LoadU16,
    /// Load effective address: write the AGU result itself.
    Ldea,
    Store8,
    Store16,
    Store32,
    /// Unassigned memory sub-opcode: performs no access and writes back
    /// zero.
    Reserved,
}

impl MemOp {
    /// Decode the 4-bit memory opcode field of a load/store word.
    fn from_raw(raw: u32) -> Self {
        match raw {
            0x1 => MemOp::Load8,
            0x2 => MemOp::Load16,
            0x3 => MemOp::Load32,
            0x5 => MemOp::LoadU8,
            0x6 => MemOp::LoadU16,
            0x7 => MemOp::Ldea,
            0x9 => MemOp::Store8,
            0xa => MemOp::Store16,
            0xb => MemOp::Store32,
            _ => MemOp::Reserved,
        }
    }
}

/// A register operand: index plus the register file it refers to.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegId {
    pub no: u32,
    pub is_vector: bool,
}

/// Decoded micro-op descriptor.
///
/// Field validity depends on the instruction: e.g. `src_imm` is only
/// meaningful when `src_b_is_imm` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decode {
    pub src_reg_a: RegId,
    pub src_reg_b: RegId,
    pub src_reg_c: RegId,
    pub dst_reg: RegId,

    pub src_imm: u32,
    pub src_b_is_imm: bool,
    /// Vector memory op with a scalar index register: lanes see the running
    /// stride-scaled offset instead of the register value.
    pub src_b_is_stride: bool,

    pub ex_op: ExOp,
    pub packed_mode: PackedMode,
    pub mem_op: MemOp,

    /// Vector operation with a per-lane sub-loop.
    pub is_vector_op: bool,
    /// Folding vector op: src_a reads from the upper half of the vector.
    pub folding: bool,
    /// Stride for vector memory address generation.
    pub stride: u32,

    /// Resolved next program counter (branches are evaluated at decode).
    pub next_pc: u32,

    /// Trace operand validity (reg2/reg3/reg1 used as a source).
    pub src_a_valid: bool,
    pub src_b_valid: bool,
    pub src_c_valid: bool,
}

impl Default for ExOp {
    fn default() -> Self {
        ExOp::Or
    }
}

/// Sign-extend/place the 15-bit immediate field.
///
/// Load/store opcodes (0x01..=0x0f) use the plain sign-extended I15 form.
/// Everything else uses I15HL: the H bit (bit 14) selects whether the
/// 14-bit payload occupies the high or the low end of the word, with the
/// vacated half filled with ones when bit 0 of the instruction is set.
#[inline]
pub fn decode_imm15(iword: u32) -> u32 {
    let op_high = iword >> 26;
    if (0x01..=0x0f).contains(&op_high) {
        // I15
        (iword & 0x7fff) | if iword & 0x4000 != 0 { 0xffff_8000 } else { 0 }
    } else if iword & 0x4000 != 0 {
        // I15HL, H-bit set: immediate in the upper 14 bits.
        ((iword & 0x3fff) << 18) | if iword & 1 != 0 { 0x0003_ffff } else { 0 }
    } else {
        // I15HL, H-bit clear: immediate in the lower 14 bits.
        (iword & 0x3fff) | if iword & 0x2000 != 0 { 0xffff_c000 } else { 0 }
    }
}

/// Decode the 18-bit branch offset (I18X4: shifted left twice,
/// sign-extended).
#[inline]
pub fn decode_imm18(iword: u32) -> u32 {
    ((iword & 0x0003_ffff) << 2) | if iword & 0x0002_0000 != 0 { 0xfff0_0000 } else { 0 }
}

/// Decode the 21-bit immediate; the form depends on the class D sub-opcode.
#[inline]
pub fn decode_imm21(iword: u32) -> u32 {
    let op = (iword >> 26).wrapping_sub(0x30);
    if op <= 4 {
        // I21X4
        ((iword & 0x001f_ffff) << 2) | if iword & 0x0010_0000 != 0 { 0xff80_0000 } else { 0 }
    } else if op == 5 {
        // I21H
        (iword & 0x001f_ffff) << 11
    } else if iword & 0x0010_0000 != 0 {
        // I21HL, H-bit set: immediate in the upper 20 bits.
        ((iword & 0x000f_ffff) << 12) | if iword & 1 != 0 { 0x0000_0fff } else { 0 }
    } else {
        // I21HL, H-bit clear: immediate in the lower 20 bits.
        (iword & 0x000f_ffff) | if iword & 0x0008_0000 != 0 { 0xfff0_0000 } else { 0 }
    }
}

/// Decode one instruction word.
///
/// `pc` is the address the word was fetched from; `regs` is the scalar
/// register file (branch conditions and j/jl bases read it, and `jl` writes
/// LR through it).
pub fn decode(iword: u32, pc: u32, regs: &mut [u32; 33]) -> Decode {
    // Detect encoding class (A, B, C, D or E).
    let class_b = (iword & 0xfc00_007c) == 0x0000_007c;
    let class_a = (iword & 0xfc00_0000) == 0 && !class_b;
    let class_e = (iword & 0xfc00_0000) == 0xdc00_0000;
    let class_d = (iword & 0xe000_0000) == 0xc000_0000 && !class_e;
    let class_c = !class_a && !class_b && !class_d && !class_e;

    // Vector mode.
    let vec_mask = if class_a {
        3
    } else if class_b || class_c {
        2
    } else {
        0
    };
    let vector_mode = (iword >> 14) & vec_mask;
    let is_vector_op = vector_mode != 0;
    let folding = vector_mode == 1;

    // Packed mode.
    let packed_mode = if class_a || class_b {
        PackedMode::from_bits((iword & 0x0000_0180) >> 7)
    } else {
        PackedMode::None
    };

    // Register fields and immediates. Validity depends on the class.
    let reg1 = (iword >> 21) & 31;
    let reg2 = (iword >> 16) & 31;
    let reg3 = (iword >> 9) & 31;
    let imm15 = decode_imm15(iword);
    let imm18 = decode_imm18(iword);
    let imm21 = decode_imm21(iword);

    // Branch handling.
    let is_bcc = class_e;
    let is_j = (iword & 0xf800_0000) == 0xc000_0000;
    let is_jl = (iword & 0xfc00_0000) == 0xc400_0000;
    let is_branch = is_bcc || is_j;

    let next_pc = if is_bcc {
        let value = regs[reg1 as usize];
        let taken = match (iword >> 18) & 7 {
            0 => value == 0,                                  // bz
            1 => value != 0,                                  // bnz
            2 => value == 0xffff_ffff,                        // bs
            3 => value != 0xffff_ffff,                        // bns
            4 => value & 0x8000_0000 != 0,                    // blt
            5 => value & 0x8000_0000 == 0,                    // bge
            6 => value & 0x8000_0000 != 0 || value == 0,      // ble
            _ => value & 0x8000_0000 == 0 && value != 0,      // bgt
        };
        if taken {
            pc.wrapping_add(imm18)
        } else {
            pc.wrapping_add(4)
        }
    } else if is_j {
        let base = if reg1 == 31 { pc } else { regs[reg1 as usize] };
        // jl writes the return address in the same step.
        if is_jl {
            regs[REG_LR as usize] = pc.wrapping_add(4);
        }
        base.wrapping_add(imm21)
    } else {
        pc.wrapping_add(4)
    };

    // Memory operation detection.
    let is_ldx = (iword & 0xfc00_0078) == 0 && (iword & 7) != 0;
    let is_ld = (iword & 0xe000_0000) == 0 && (iword & 0x1c00_0000) != 0;
    let is_ldwpc = (iword & 0xfc00_0000) == 0xc800_0000;
    let is_mem_load = is_ldx || is_ld || is_ldwpc;
    let is_stx = (iword & 0xfc00_0078) == 0x0000_0008;
    let is_st = (iword & 0xe000_0000) == 0x2000_0000;
    let is_stwpc = (iword & 0xfc00_0000) == 0xcc00_0000;
    let is_mem_store = is_stx || is_st || is_stwpc;
    let is_mem_op = is_mem_load || is_mem_store;

    let is_addpc_addpchi = (iword & 0xf800_0000) == 0xd000_0000;

    // Three-source instructions: stores, the MADD/SEL/IBF group and
    // branches (the condition register).
    let is_3op_group =
        (iword & 0xfc00_007c) == 0x0000_002c || (iword & 0xf000_0000) == 0xb000_0000;
    let reg1_is_src = is_mem_store || is_3op_group || is_branch;
    let reg2_is_src = class_a || class_b || class_c;
    let reg3_is_src = class_a;
    let reg1_is_dst = !(is_mem_store || is_branch);

    let src_reg_a = if is_ldwpc || is_stwpc || is_addpc_addpchi {
        REG_PC
    } else {
        reg2
    };
    let dst_reg = if reg1_is_dst { reg1 } else { REG_Z };

    // EX operation.
    let ex_op = if class_a && (iword & 0x0000_01f0) != 0 {
        ExOp::from_raw(iword & 0x7f)
    } else if class_b {
        ExOp::from_raw(((iword >> 1) & 0x3f00) | (iword & 0x7f))
    } else if class_c && (iword & 0xc000_0000) != 0 {
        ExOp::from_raw(iword >> 26)
    } else if class_d {
        match (iword >> 26) & 7 {
            4 => ExOp::AddPc,
            5 => ExOp::AddPcHi,
            6 => ExOp::Ldi,
            _ => ExOp::Or,
        }
    } else {
        ExOp::Or
    };

    // MEM operation.
    let mem_op = if is_ldwpc {
        MemOp::Load32
    } else if is_stwpc {
        MemOp::Store32
    } else if is_mem_op {
        if class_a {
            MemOp::from_raw(iword & 0x7f)
        } else {
            MemOp::from_raw(iword >> 26)
        }
    } else {
        MemOp::None
    };

    // Register file selection (scalar or vector) per operand.
    let reg1_is_vector = is_vector_op;
    let reg2_is_vector = is_vector_op && !is_mem_op;
    let reg3_is_vector = vector_mode & 1 != 0;

    Decode {
        src_reg_a: RegId { no: src_reg_a, is_vector: reg2_is_vector },
        src_reg_b: RegId { no: reg3, is_vector: reg3_is_vector },
        src_reg_c: RegId { no: reg1, is_vector: reg1_is_vector },
        dst_reg: RegId { no: dst_reg, is_vector: is_vector_op },

        src_imm: if class_c { imm15 } else { imm21 },
        src_b_is_imm: class_c || class_d,
        src_b_is_stride: is_vector_op && is_mem_op && !reg3_is_vector,

        ex_op,
        packed_mode,
        mem_op,

        is_vector_op,
        folding,
        stride: if is_vector_op {
            if class_c {
                imm15
            } else {
                regs[reg3 as usize]
            }
        } else {
            0
        },

        next_pc,

        src_a_valid: reg2_is_src,
        src_b_valid: reg3_is_src,
        src_c_valid: reg1_is_src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_regs() -> [u32; 33] {
        [0u32; 33]
    }

    /// Encode a class A (three-register) instruction.
    fn enc_a(op: u32, reg1: u32, reg2: u32, reg3: u32, vec: u32, packed: u32) -> u32 {
        (reg1 << 21) | (reg2 << 16) | (vec << 14) | (reg3 << 9) | (packed << 7) | op
    }

    /// Encode a class C (register + imm15) instruction.
    fn enc_c(op: u32, reg1: u32, reg2: u32, imm15: u32) -> u32 {
        (op << 26) | (reg1 << 21) | (reg2 << 16) | (imm15 & 0x7fff)
    }

    #[test]
    fn test_class_a_add() {
        let mut regs = fresh_regs();
        let d = decode(enc_a(0x16, 1, 2, 3, 0, 0), 0x200, &mut regs);
        assert_eq!(d.ex_op, ExOp::Add);
        assert_eq!(d.dst_reg.no, 1);
        assert_eq!(d.src_reg_a.no, 2);
        assert_eq!(d.src_reg_b.no, 3);
        assert!(!d.src_b_is_imm);
        assert!(!d.is_vector_op);
        assert_eq!(d.mem_op, MemOp::None);
        assert_eq!(d.next_pc, 0x204);
    }

    #[test]
    fn test_class_c_immediate() {
        let mut regs = fresh_regs();
        let d = decode(enc_c(0x16, 1, 2, 42), 0, &mut regs);
        assert_eq!(d.ex_op, ExOp::Add);
        assert!(d.src_b_is_imm);
        assert_eq!(d.src_imm, 42);
    }

    #[test]
    fn test_imm15_forms() {
        // Load/store range: plain sign extension.
        assert_eq!(decode_imm15(0x0400_0000 | 0x1234), 0x1234);
        assert_eq!(decode_imm15(0x0400_0000 | 0x4321), 0xffff_c321);
        // I15HL, H-bit clear, positive and negative payloads.
        assert_eq!(decode_imm15(0x4000_0000 | 0x1234), 0x1234);
        assert_eq!(decode_imm15(0x4000_0000 | 0x2001), 0xffff_e001);
        // I15HL, H-bit set: payload lands in the upper 14 bits, low fill
        // selected by instruction bit 0.
        assert_eq!(decode_imm15(0x4000_0000 | 0x4000 | 0x1000), 0x4000_0000);
        assert_eq!(decode_imm15(0x4000_0000 | 0x4000 | 0x1001), 0x4007_ffff);
    }

    #[test]
    fn test_imm21_forms() {
        // j (opcode 0x30): I21X4.
        assert_eq!(decode_imm21(0xc000_0000 | 0x1000), 0x4000);
        assert_eq!(decode_imm21(0xc000_0000 | 0x0010_0000), 0xffc0_0000);
        // ldi (opcode 0x36): I21HL low placement.
        assert_eq!(decode_imm21(0xd800_0000 | 0x0001_2345), 0x0001_2345);
        // ldi with H bit: upper 20 bits, all-ones fill from bit 0.
        assert_eq!(decode_imm21(0xd800_0000 | 0x0010_0000 | 0x12000), 0x1200_0000);
        assert_eq!(decode_imm21(0xd800_0000 | 0x0010_0000 | 0x12001), 0x1200_1fff);
    }

    #[test]
    fn test_branch_conditions() {
        let mut regs = fresh_regs();
        // blt r1, +8 with the sign bit set is taken.
        regs[1] = 0x8000_0000;
        let bcc = 0xdc00_0000 | (1 << 21) | (4 << 18) | 2; // offset field 2 => +8
        let d = decode(bcc, 0x100, &mut regs);
        assert_eq!(d.next_pc, 0x108);

        // Same branch with a positive value falls through.
        regs[1] = 1;
        let d = decode(bcc, 0x100, &mut regs);
        assert_eq!(d.next_pc, 0x104);

        // bs is an all-ones test, not a sign test.
        regs[1] = 0xffff_ffff;
        let bs = 0xdc00_0000 | (1 << 21) | (2 << 18) | 4;
        let d = decode(bs, 0x100, &mut regs);
        assert_eq!(d.next_pc, 0x110);
        regs[1] = 0x8000_0000;
        let d = decode(bs, 0x100, &mut regs);
        assert_eq!(d.next_pc, 0x104);
    }

    #[test]
    fn test_jump_and_link() {
        let mut regs = fresh_regs();
        regs[5] = 0x1000;
        // j r5, #0x20
        let j = 0xc000_0000 | (5 << 21) | 0x8;
        let d = decode(j, 0x100, &mut regs);
        assert_eq!(d.next_pc, 0x1020);
        assert_eq!(regs[REG_LR as usize], 0);

        // jl r5, #0x20 also writes LR.
        let jl = 0xc400_0000 | (5 << 21) | 0x8;
        let d = decode(jl, 0x100, &mut regs);
        assert_eq!(d.next_pc, 0x1020);
        assert_eq!(regs[REG_LR as usize], 0x104);

        // Register 31 selects PC as the base.
        let j_pc = 0xc000_0000 | (31 << 21) | 0x8;
        let d = decode(j_pc, 0x100, &mut regs);
        assert_eq!(d.next_pc, 0x120);
    }

    #[test]
    fn test_store_has_no_destination() {
        let mut regs = fresh_regs();
        // stw r1, r2, #4 (class C opcode 0x0b).
        let d = decode(enc_c(0x0b, 1, 2, 4), 0, &mut regs);
        assert_eq!(d.mem_op, MemOp::Store32);
        assert_eq!(d.dst_reg.no, REG_Z);
        assert_eq!(d.src_reg_c.no, 1);
        assert!(d.src_c_valid);
    }

    #[test]
    fn test_scaled_load() {
        let mut regs = fresh_regs();
        // Class A ldh with a half-word index scale.
        let d = decode(enc_a(0x2, 1, 2, 3, 0, 1), 0, &mut regs);
        assert_eq!(d.mem_op, MemOp::Load16);
        assert_eq!(d.packed_mode, PackedMode::Byte);
        assert_eq!(d.packed_mode.index_scale(), 2);
    }

    #[test]
    fn test_class_b_two_operand() {
        let mut regs = fresh_regs();
        // clz r1, r2: class B, low bits 0x7c, high function field 0x01.
        let iword = (1 << 21) | (2 << 16) | (0x01 << 9) | 0x7c;
        let d = decode(iword, 0, &mut regs);
        assert_eq!(d.ex_op, ExOp::Clz);
    }

    #[test]
    fn test_vector_tagging() {
        let mut regs = fresh_regs();
        regs[31] = 16; // VL

        // Vector-vector add (vector mode 3).
        let d = decode(enc_a(0x16, 1, 2, 3, 3, 0), 0, &mut regs);
        assert!(d.is_vector_op);
        assert!(!d.folding);
        assert!(d.src_reg_a.is_vector);
        assert!(d.src_reg_b.is_vector);
        assert!(d.dst_reg.is_vector);

        // Vector-scalar add (vector mode 2): reg_b stays scalar.
        let d = decode(enc_a(0x16, 1, 2, 3, 2, 0), 0, &mut regs);
        assert!(d.is_vector_op);
        assert!(!d.src_reg_b.is_vector);

        // Folding op (vector mode 1).
        let d = decode(enc_a(0x16, 1, 2, 3, 1, 0), 0, &mut regs);
        assert!(d.is_vector_op);
        assert!(d.folding);
    }

    #[test]
    fn test_vector_memory_stride() {
        let mut regs = fresh_regs();
        regs[3] = 8;
        // Vector load with a scalar stride register (class A, vector mode 2).
        let d = decode(enc_a(0x3, 1, 2, 3, 2, 0), 0, &mut regs);
        assert_eq!(d.mem_op, MemOp::Load32);
        assert!(d.src_b_is_stride);
        assert_eq!(d.stride, 8);
        // A vector op's source a stays scalar for memory ops.
        assert!(!d.src_reg_a.is_vector);
        assert!(d.dst_reg.is_vector);
    }

    #[test]
    fn test_ldi_forms() {
        let mut regs = fresh_regs();
        // ldi r1, #42 (class D, sub-opcode 6).
        let iword = 0xd800_0000 | (1 << 21) | 42;
        let d = decode(iword, 0, &mut regs);
        assert_eq!(d.ex_op, ExOp::Ldi);
        assert!(d.src_b_is_imm);
        assert_eq!(d.src_imm, 42);
    }

    #[test]
    fn test_addpc_uses_pc_operand() {
        let mut regs = fresh_regs();
        // addpc r1, #8 (class D, sub-opcode 4).
        let iword = 0xd000_0000 | (1 << 21) | 2;
        let d = decode(iword, 0x400, &mut regs);
        assert_eq!(d.ex_op, ExOp::AddPc);
        assert_eq!(d.src_reg_a.no, REG_PC);
    }

    #[test]
    fn test_reserved_opcode_decodes_as_or() {
        let mut regs = fresh_regs();
        let d = decode(enc_a(0x25, 1, 2, 3, 0, 0), 0, &mut regs);
        assert_eq!(d.ex_op, ExOp::Or);
    }
}
