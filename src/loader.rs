//! Program loading and guest argument setup.
//!
//! Executables are either ELF32 images (the normal toolchain output) or raw
//! binaries placed at a fixed load address. The ELF path loads all ALLOC
//! sections: PROGBITS/INIT_ARRAY/FINI_ARRAY bytes are copied into RAM and
//! NOBITS ranges are zero-filled; the start address is the first ALLOC
//! PROGBITS section (the text segment).
//!
//! Program arguments are made visible to the guest as a
//! `{argc, argv[argc], strings}` block in a reserved window just below the
//! syscall trap page.

use crate::ram::Ram;
use anyhow::{bail, Context, Result};
use goblin::elf::section_header::{
    SHF_ALLOC, SHT_FINI_ARRAY, SHT_INIT_ARRAY, SHT_NOBITS, SHT_PROGBITS,
};
use goblin::elf::Elf;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// ELF machine number for MRISC32.
pub const EM_MRISC32: u16 = 0xc001;

/// Start of the guest-visible program argument block.
pub const SIM_ARGS_START: u32 = 0xfff0_0000;
/// End (exclusive) of the argument block; the trap page starts here.
pub const SIM_ARGS_END: u32 = 0xffff_0000;

/// Load an executable into RAM and return its start address.
///
/// ELF32 images are detected by magic; anything else is loaded as a raw
/// binary at `fallback_addr`.
pub fn load_executable(path: &Path, ram: &mut Ram, fallback_addr: u32) -> Result<u32> {
    let file = File::open(path)
        .with_context(|| format!("Unable to open the program file {}", path.display()))?;
    // Safety: the mapping is read-only and lives for the duration of the
    // load only.
    let data = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Unable to map the program file {}", path.display()))?;

    if data.starts_with(b"\x7fELF") {
        load_elf32(&data, ram, path)
    } else {
        ram.slice_mut(fallback_addr, data.len() as u32)
            .with_context(|| {
                format!(
                    "Raw binary of {} bytes does not fit at 0x{:08x}",
                    data.len(),
                    fallback_addr
                )
            })?
            .copy_from_slice(&data);
        log::info!(
            "Read {} bytes from {} into RAM @ 0x{:08x}",
            data.len(),
            path.display(),
            fallback_addr
        );
        Ok(fallback_addr)
    }
}

fn load_elf32(data: &[u8], ram: &mut Ram, path: &Path) -> Result<u32> {
    let elf = Elf::parse(data)
        .with_context(|| format!("Unable to parse {} as ELF", path.display()))?;
    if elf.is_64 {
        bail!("{} is a 64-bit ELF; expected ELF32", path.display());
    }
    if elf.header.e_machine != EM_MRISC32 {
        log::warn!(
            "{} has ELF machine type 0x{:04x}, expected MRISC32 (0x{:04x})",
            path.display(),
            elf.header.e_machine,
            EM_MRISC32
        );
    }

    let mut text_address = 0u32;
    for sh in &elf.section_headers {
        if sh.sh_flags & SHF_ALLOC as u64 == 0 {
            continue;
        }
        let addr = sh.sh_addr as u32;
        let size = sh.sh_size as u32;

        // The first allocated PROGBITS section is the text segment.
        if sh.sh_type == SHT_PROGBITS && text_address == 0 {
            text_address = addr;
        }

        match sh.sh_type {
            SHT_PROGBITS | SHT_INIT_ARRAY | SHT_FINI_ARRAY => {
                let file_range = sh.sh_offset as usize..(sh.sh_offset + sh.sh_size) as usize;
                let bytes = data
                    .get(file_range)
                    .with_context(|| format!("Section data out of bounds in {}", path.display()))?;
                ram.slice_mut(addr, size)
                    .with_context(|| format!("Section does not fit in RAM @ 0x{:08x}", addr))?
                    .copy_from_slice(bytes);
            }
            SHT_NOBITS => {
                ram.slice_mut(addr, size)
                    .with_context(|| format!("Section does not fit in RAM @ 0x{:08x}", addr))?
                    .fill(0);
            }
            _ => {}
        }
    }

    log::info!(
        "Read ELF32 executable {} into RAM @ 0x{:08x}",
        path.display(),
        text_address
    );
    Ok(text_address)
}

/// Write the guest-visible `{argc, argv, strings}` block.
///
/// Does nothing (with a warning) when the RAM does not reach the argument
/// window; fails when the arguments do not fit in the window.
pub fn write_sim_args(ram: &mut Ram, args: &[String]) -> Result<()> {
    if !ram.valid_range(SIM_ARGS_START, 4) {
        log::warn!("RAM does not cover the argument window; argc/argv not set up");
        return Ok(());
    }

    ram.store32(SIM_ARGS_START, args.len() as u32)?;
    let mut argv_addr = SIM_ARGS_START + 4;
    let mut str_addr = argv_addr + 4 * args.len() as u32;
    for arg in args {
        ram.store32(argv_addr, str_addr)?;
        argv_addr += 4;

        for &byte in arg.as_bytes().iter().chain(std::iter::once(&0)) {
            if str_addr >= SIM_ARGS_END {
                bail!("Too many and too long program arguments.");
            }
            ram.store8(str_addr, byte as u32)?;
            str_addr += 1;
        }
    }
    Ok(())
}
