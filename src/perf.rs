//! Performance symbol profiler.
//!
//! Attributes executed cycles to functions using a symbol file with one
//! `AAAAAAAA name` entry per line (eight hex digits, a separator character,
//! then the symbol name). The table is sorted by address and bracketed with
//! sentinel entries so every address falls into some range.
//!
//! `add_ref` is called once per executed lane from the hot loop, so it
//! keeps a last-hit index: consecutive instructions almost always belong to
//! the same function.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One profiled function.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// Starting (call) address of the function.
    pub addr: u32,
    /// Function name.
    pub name: String,
    /// Cycles attributed to this function.
    pub cycles: u64,
}

/// Address-sorted symbol table with cycle counters.
#[derive(Debug, Default)]
pub struct PerfSymbols {
    symbols: Vec<Symbol>,
    last_idx: usize,
}

impl PerfSymbols {
    /// An empty profiler; `add_ref` is a no-op until symbols are loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a symbol file and prepare the lookup table.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)
            .with_context(|| format!("Unable to open symbol file {}", path.display()))?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.len() < 9 {
                continue;
            }
            let addr = u32::from_str_radix(&line[0..8], 16)
                .with_context(|| format!("Bad symbol address in line: {}", line))?;
            self.symbols.push(Symbol {
                addr,
                name: line[9..].to_string(),
                cycles: 0,
            });
        }

        // Bracket the table so lookups always land in a range.
        self.symbols.push(Symbol {
            addr: 0x0000_0000,
            name: "<NULL>".to_string(),
            cycles: 0,
        });
        self.symbols.push(Symbol {
            addr: 0xffff_ffff,
            name: "<END>".to_string(),
            cycles: 0,
        });
        self.symbols.sort_by_key(|s| s.addr);

        log::info!(
            "Loaded {} perf symbols from {}",
            self.symbols.len() - 2,
            path.display()
        );
        Ok(())
    }

    /// True once a symbol file has been loaded.
    pub fn has_symbols(&self) -> bool {
        !self.symbols.is_empty()
    }

    /// Attribute one cycle to the function containing `addr`.
    #[inline]
    pub fn add_ref(&mut self, addr: u32) {
        if self.symbols.is_empty() {
            return;
        }

        // Fast path: same function as the previous instruction.
        if self.symbols[self.last_idx].addr <= addr && addr <= self.symbols[self.last_idx + 1].addr
        {
            self.symbols[self.last_idx].cycles += 1;
            return;
        }

        // Binary search over the range starts.
        let mut lo = 0usize;
        let mut hi = self.symbols.len() - 2;
        while lo <= hi {
            let mid = (lo + hi) >> 1;
            if self.symbols[mid + 1].addr <= addr {
                lo = mid + 1;
            } else if self.symbols[mid].addr > addr {
                hi = mid - 1;
            } else {
                self.last_idx = mid;
                self.symbols[mid].cycles += 1;
                break;
            }
        }
    }

    /// Print all symbols with non-zero cycle counts, hottest first.
    pub fn print(&self) {
        let mut syms: Vec<_> = self.symbols.iter().filter(|s| s.cycles > 0).collect();
        syms.sort_by_key(|s| std::cmp::Reverse(s.cycles));

        println!("Address (hex)\tCycles\tFunction");
        for sym in syms {
            println!("0x{:08x}\t{}\t{}", sym.addr, sym.cycles, sym.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_loaded() -> PerfSymbols {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "00000200 _start").unwrap();
        writeln!(file, "00000300 main").unwrap();
        writeln!(file, "00000500 helper").unwrap();
        file.flush().unwrap();

        let mut perf = PerfSymbols::new();
        perf.load(file.path()).unwrap();
        perf
    }

    fn cycles_of(perf: &PerfSymbols, name: &str) -> u64 {
        perf.symbols
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.cycles)
            .unwrap()
    }

    #[test]
    fn test_empty_profiler_is_noop() {
        let mut perf = PerfSymbols::new();
        assert!(!perf.has_symbols());
        perf.add_ref(0x1234); // must not panic
    }

    #[test]
    fn test_attribution_by_range() {
        let mut perf = make_loaded();
        assert!(perf.has_symbols());

        perf.add_ref(0x210);
        perf.add_ref(0x2fc);
        perf.add_ref(0x310);
        perf.add_ref(0x4ff);
        perf.add_ref(0x510);
        perf.add_ref(0x700);

        assert_eq!(cycles_of(&perf, "_start"), 2);
        assert_eq!(cycles_of(&perf, "main"), 2);
        assert_eq!(cycles_of(&perf, "helper"), 2);
    }

    #[test]
    fn test_addresses_below_first_symbol() {
        let mut perf = make_loaded();
        perf.add_ref(0x10);
        assert_eq!(cycles_of(&perf, "<NULL>"), 1);
    }

    #[test]
    fn test_alternating_lookup() {
        // Forces the binary-search path on every other call.
        let mut perf = make_loaded();
        for _ in 0..10 {
            perf.add_ref(0x210);
            perf.add_ref(0x610);
        }
        assert_eq!(cycles_of(&perf, "_start"), 10);
        assert_eq!(cycles_of(&perf, "helper"), 10);
    }
}
