//! MRISC32 CPU core.
//!
//! Architectural state and the public run surface. The heavy lifting lives
//! in the submodules:
//!
//! - [`decode`]: instruction word → micro-op descriptor
//! - [`alu`]: EX-stage kernels for every opcode and packed mode
//! - [`float`]: IEEE single helpers and the packed narrow-float types
//! - [`exec`]: the fetch/decode/execute loop
//! - [`trace`]: binary execution trace writer
//!
//! One `Cpu` borrows its RAM and perf-symbol sink for its whole life; the
//! register files are owned exclusively. `terminate_handle` hands out an
//! atomic flag that another thread may set to stop the loop at the next
//! instruction boundary.

pub mod alu;
pub mod decode;
pub mod exec;
pub mod float;
pub mod trace;

use crate::config::Config;
use crate::mmio;
use crate::perf::PerfSymbols;
use crate::ram::{MemError, Ram};
use crate::syscalls::Syscalls;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Scalar register count; R32 is the PC and only implicitly addressable.
pub const NUM_REGS: usize = 33;

/// log2 of the vector register length. Must be at least 4.
pub const LOG2_NUM_VECTOR_ELEMENTS: u32 = 4;
/// Lanes per vector register.
pub const NUM_VECTOR_ELEMENTS: u32 = 1 << LOG2_NUM_VECTOR_ELEMENTS;
/// Vector register count.
pub const NUM_VECTOR_REGS: usize = 32;

// Named registers.
pub const REG_Z: u32 = 0;
pub const REG_TP: u32 = 27;
pub const REG_FP: u32 = 28;
pub const REG_SP: u32 = 29;
pub const REG_LR: u32 = 30;
pub const REG_VL: u32 = 31;
pub const REG_PC: u32 = 32;

/// One vector register.
pub type VReg = [u32; NUM_VECTOR_ELEMENTS as usize];

/// Coarse execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// After reset, before run.
    Idle,
    /// Inside `run`.
    Running,
    /// Exited, cycle budget hit, or externally terminated.
    Halted,
}

/// A fatal memory fault, annotated with the register state at the point of
/// failure.
#[derive(Debug, Error)]
#[error("{source}{dump}")]
pub struct ExecError {
    #[source]
    pub source: MemError,
    pub dump: String,
}

/// A single MRISC32 CPU core.
///
/// The core borrows its RAM (shared with the loader and any external MMIO
/// writers) and a perf-symbol sink, and owns everything else.
pub struct Cpu<'a> {
    pub(crate) ram: &'a mut Ram,
    pub(crate) perf: &'a mut PerfSymbols,
    pub(crate) syscalls: Syscalls,

    pub(crate) regs: [u32; NUM_REGS],
    pub(crate) vregs: [VReg; NUM_VECTOR_REGS],

    pub(crate) fetched_instr_count: u64,
    pub(crate) vector_loop_count: u64,
    pub(crate) total_cycle_count: u64,

    pub(crate) terminate_requested: Arc<AtomicBool>,
    pub(crate) state: State,
    pub(crate) trace: Option<trace::TraceWriter>,
    pub(crate) mmio_present: bool,

    start_time: Option<Instant>,
    stop_time: Option<Instant>,
}

impl<'a> Cpu<'a> {
    /// Create a CPU against a RAM and a perf-symbol sink.
    ///
    /// Fails only if the configured trace file cannot be created.
    pub fn new(ram: &'a mut Ram, perf: &'a mut PerfSymbols, config: &Config) -> io::Result<Self> {
        let trace = match &config.trace_file {
            Some(path) => Some(trace::TraceWriter::create(path)?),
            None => None,
        };
        let mmio_present = mmio::present(ram);
        let mut cpu = Self {
            ram,
            perf,
            syscalls: Syscalls::new(),
            regs: [0; NUM_REGS],
            vregs: [[0; NUM_VECTOR_ELEMENTS as usize]; NUM_VECTOR_REGS],
            fetched_instr_count: 0,
            vector_loop_count: 0,
            total_cycle_count: 0,
            terminate_requested: Arc::new(AtomicBool::new(false)),
            state: State::Idle,
            trace,
            mmio_present,
            start_time: None,
            stop_time: None,
        };
        cpu.reset();
        Ok(cpu)
    }

    /// Reset all architectural state and return to idle.
    pub fn reset(&mut self) {
        self.regs = [0; NUM_REGS];
        self.vregs = [[0; NUM_VECTOR_ELEMENTS as usize]; NUM_VECTOR_REGS];
        self.syscalls.clear();
        self.terminate_requested.store(false, Ordering::Relaxed);
        self.state = State::Idle;
    }

    /// Request termination at the next instruction boundary.
    pub fn terminate(&self) {
        self.terminate_requested.store(true, Ordering::Relaxed);
    }

    /// A handle that another thread can use to stop this CPU.
    pub fn terminate_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.terminate_requested)
    }

    /// Current coarse execution state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Read a scalar register. Register 0 always reads as zero.
    pub fn reg(&self, no: u32) -> u32 {
        self.regs[no as usize]
    }

    /// Write a scalar register. Writes to register 0 are dropped.
    pub fn set_reg(&mut self, no: u32, value: u32) {
        if no != REG_Z {
            self.regs[no as usize] = value;
        }
    }

    /// Read one lane of a vector register.
    pub fn vreg_lane(&self, no: u32, lane: u32) -> u32 {
        self.vregs[no as usize][lane as usize]
    }

    /// Write one lane of a vector register.
    pub fn set_vreg_lane(&mut self, no: u32, lane: u32, value: u32) {
        self.vregs[no as usize][lane as usize] = value;
    }

    /// Instructions fetched by the last run.
    pub fn fetched_instr_count(&self) -> u64 {
        self.fetched_instr_count
    }

    /// Vector lane iterations executed by the last run.
    pub fn vector_loop_count(&self) -> u64 {
        self.vector_loop_count
    }

    /// Total cycles simulated by the last run.
    pub fn total_cycle_count(&self) -> u64 {
        self.total_cycle_count
    }

    /// Exchange with a system register: returns the old value, and would
    /// apply a write for non-Z sources if any register were writable.
    pub(crate) fn xchgsr(&mut self, _a: u32, b: u32, _a_is_z: bool) -> u32 {
        match b {
            // CPU_FEATURES_0:
            //   VM (vector module)          = 1 << 0
            //   PM (packed operations)      = 1 << 1
            //   FM (floating-point module)  = 1 << 2
            //   SM (saturating arithmetic)  = 1 << 3
            0x00 => 0x0000_000f,
            0x10 => NUM_VECTOR_ELEMENTS,     // MAX_VL
            0x11 => LOG2_NUM_VECTOR_ELEMENTS, // LOG2_MAX_VL
            // CPU_FEATURES_1..15 and everything else read as zero, and there
            // are currently no writable system registers.
            _ => 0,
        }
    }

    pub(crate) fn update_mmio_clkcnt(&mut self) {
        if self.mmio_present {
            let _ = self
                .ram
                .store32(mmio::MMIO_BASE + mmio::CLKCNTLO, self.total_cycle_count as u32);
            let _ = self.ram.store32(
                mmio::MMIO_BASE + mmio::CLKCNTHI,
                (self.total_cycle_count >> 32) as u32,
            );
        }
    }

    /// Print run statistics from the last `run` call.
    pub fn dump_stats(&self) {
        let dt = match (self.start_time, self.stop_time) {
            (Some(start), Some(stop)) => stop.duration_since(start).as_secs_f64(),
            _ => 0.0,
        };
        let mcycles_per_s = if dt > 0.0 {
            1.0e-6 * self.total_cycle_count as f64 / dt
        } else {
            0.0
        };
        println!("CPU instructions:");
        println!(" Fetched instructions: {}", self.fetched_instr_count);
        println!(" Vector loops:         {}", self.vector_loop_count);
        println!(" Total CPU cycles:     {}", self.total_cycle_count);
        println!(" Mcycles/s:            {:.2}", mcycles_per_s);
    }

    /// Dump the RAM range `[begin, end)` to a file.
    pub fn dump_ram(&self, begin: u32, end: u32, path: &std::path::Path) -> anyhow::Result<()> {
        let mut file = io::BufWriter::new(std::fs::File::create(path)?);
        for addr in begin..end {
            let byte = self.ram.load8(addr)? as u8;
            file.write_all(&[byte])?;
        }
        file.flush()?;
        Ok(())
    }

    pub(crate) fn begin_simulation(&mut self) {
        self.start_time = Some(Instant::now());
    }

    pub(crate) fn end_simulation(&mut self) {
        self.stop_time = Some(Instant::now());
        if let Some(trace) = &mut self.trace {
            if let Err(e) = trace.flush() {
                log::warn!("Failed to flush trace buffer: {}", e);
            }
        }
    }

    /// Format the register state for fatal error reports.
    pub(crate) fn register_dump(&self) -> String {
        let mut dump = String::from("\n");
        for i in 1..=26 {
            let _ = writeln!(dump, "R{}: 0x{:08x}", i, self.regs[i]);
        }
        let _ = writeln!(dump, "TP: 0x{:08x}", self.regs[REG_TP as usize]);
        let _ = writeln!(dump, "FP: 0x{:08x}", self.regs[REG_FP as usize]);
        let _ = writeln!(dump, "SP: 0x{:08x}", self.regs[REG_SP as usize]);
        let _ = writeln!(dump, "LR: 0x{:08x}", self.regs[REG_LR as usize]);
        let _ = writeln!(dump, "VL: 0x{:08x}", self.regs[REG_VL as usize]);
        let _ = writeln!(dump, "PC: 0x{:08x}", self.regs[REG_PC as usize]);
        dump
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_parts() -> (Ram, PerfSymbols, Config) {
        (Ram::new(0x10000), PerfSymbols::new(), Config::default())
    }

    #[test]
    fn test_reg_zero_is_hardwired() {
        let (mut ram, mut perf, config) = make_parts();
        let mut cpu = Cpu::new(&mut ram, &mut perf, &config).unwrap();
        cpu.set_reg(REG_Z, 0xdead_beef);
        assert_eq!(cpu.reg(REG_Z), 0);
        cpu.set_reg(1, 0xdead_beef);
        assert_eq!(cpu.reg(1), 0xdead_beef);
    }

    #[test]
    fn test_reset_clears_state() {
        let (mut ram, mut perf, config) = make_parts();
        let mut cpu = Cpu::new(&mut ram, &mut perf, &config).unwrap();
        cpu.set_reg(5, 42);
        cpu.set_vreg_lane(3, 7, 99);
        cpu.terminate();
        cpu.reset();
        assert_eq!(cpu.reg(5), 0);
        assert_eq!(cpu.vreg_lane(3, 7), 0);
        assert_eq!(cpu.state(), State::Idle);
        assert!(!cpu.terminate_requested.load(Ordering::Relaxed));
    }

    #[test]
    fn test_xchgsr_registers() {
        let (mut ram, mut perf, config) = make_parts();
        let mut cpu = Cpu::new(&mut ram, &mut perf, &config).unwrap();
        assert_eq!(cpu.xchgsr(0, 0x00, true), 0x0f);
        assert_eq!(cpu.xchgsr(0, 0x10, true), NUM_VECTOR_ELEMENTS);
        assert_eq!(cpu.xchgsr(0, 0x11, true), LOG2_NUM_VECTOR_ELEMENTS);
        assert_eq!(cpu.xchgsr(0, 0x05, true), 0);
        assert_eq!(cpu.xchgsr(0, 0x1234, false), 0);
    }

    #[test]
    fn test_register_dump_format() {
        let (mut ram, mut perf, config) = make_parts();
        let mut cpu = Cpu::new(&mut ram, &mut perf, &config).unwrap();
        cpu.set_reg(1, 0xcafe_f00d);
        cpu.set_reg(REG_SP, 0x0001_0000);
        let dump = cpu.register_dump();
        assert!(dump.contains("R1: 0xcafef00d"));
        assert!(dump.contains("SP: 0x00010000"));
        assert!(dump.contains("PC: 0x00000000"));
    }

    #[test]
    fn test_dump_ram() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ram.bin");
        let (mut ram, mut perf, config) = make_parts();
        ram.slice_mut(0x100, 4).unwrap().copy_from_slice(b"mr32");
        let cpu = Cpu::new(&mut ram, &mut perf, &config).unwrap();
        cpu.dump_ram(0x100, 0x104, &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"mr32");
    }
}
