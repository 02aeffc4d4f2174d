//! Host syscall bridge.
//!
//! Guest programs call into the simulator by jumping to the reserved trap
//! page at [`TRAP_PAGE`]; the routine index is the word offset into the
//! page. Arguments arrive in r1..r3 and the result goes back in r1 (plus r2
//! for 64-bit results). Syscall failures are reported as −1 in r1 and never
//! stop the CPU.
//!
//! Guest file descriptors 0..=2 alias the host's stdio and are never
//! closed; descriptors for real files are handed out from 3 and kept in a
//! translation table, so host descriptors never leak into guest state.
//! Guest paths are NUL-terminated strings copied verbatim (mapping them
//! onto a sandboxed host directory would slot in here).

use crate::cpu::NUM_REGS;
use crate::ram::{MemError, Ram};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, IsTerminal, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Base address of the syscall trap page.
pub const TRAP_PAGE: u32 = 0xffff_0000;

/// Routine indices within the trap page.
pub mod routines {
    pub const EXIT: u32 = 0;
    pub const PUTCHAR: u32 = 1;
    pub const GETCHAR: u32 = 2;
    pub const CLOSE: u32 = 3;
    pub const FSTAT: u32 = 4;
    pub const ISATTY: u32 = 5;
    pub const LINK: u32 = 6;
    pub const LSEEK: u32 = 7;
    pub const MKDIR: u32 = 8;
    pub const OPEN: u32 = 9;
    pub const READ: u32 = 10;
    pub const STAT: u32 = 11;
    pub const UNLINK: u32 = 12;
    pub const WRITE: u32 = 13;
    pub const GETTIMEMICROS: u32 = 14;
    /// One past the highest assigned routine.
    pub const COUNT: u32 = 15;
}

const ERR: u32 = u32::MAX;

/// Size of the guest stat record.
const STAT_RECORD_SIZE: u32 = 72;

/// Guest `open` flag bits (newlib convention).
const GUEST_O_ACCMODE: u32 = 0x0003;
const GUEST_O_WRONLY: u32 = 0x0001;
const GUEST_O_RDWR: u32 = 0x0002;
const GUEST_O_APPEND: u32 = 0x0008;
const GUEST_O_CREAT: u32 = 0x0200;
const GUEST_O_TRUNC: u32 = 0x0400;

/// The guest-visible stat record (newlib layout, 72 bytes).
#[derive(Debug, Clone, Copy, Default)]
struct StatRecord {
    dev: u16,
    ino: u16,
    mode: u32,
    nlink: u16,
    uid: u16,
    gid: u16,
    rdev: u16,
    size: u32,
    atime: (i64, u32),
    mtime: (i64, u32),
    ctime: (i64, u32),
    blksize: u32,
    blocks: u32,
}

impl StatRecord {
    /// Serialize to guest memory at `addr` with the fixed little-endian
    /// field offsets. The caller has validated the buffer range; alignment
    /// faults still propagate.
    fn store(&self, ram: &mut Ram, addr: u32) -> Result<(), MemError> {
        ram.store16(addr, self.dev as u32)?;
        ram.store16(addr + 2, self.ino as u32)?;
        ram.store32(addr + 4, self.mode)?;
        ram.store16(addr + 8, self.nlink as u32)?;
        ram.store16(addr + 10, self.uid as u32)?;
        ram.store16(addr + 12, self.gid as u32)?;
        ram.store16(addr + 14, self.rdev as u32)?;
        ram.store32(addr + 16, self.size)?;
        for (off, (sec, nsec)) in [(20, self.atime), (32, self.mtime), (44, self.ctime)] {
            ram.store32(addr + off, sec as u32)?;
            ram.store32(addr + off + 4, (sec >> 32) as u32)?;
            ram.store32(addr + off + 8, nsec)?;
        }
        ram.store32(addr + 56, self.blksize)?;
        ram.store32(addr + 60, self.blocks)?;
        // Bytes 64..71 are reserved and left untouched.
        Ok(())
    }

    /// A character-device record for the stdio descriptors.
    fn char_device() -> Self {
        Self {
            mode: 0o020666,
            nlink: 1,
            blksize: 1024,
            ..Default::default()
        }
    }
}

#[cfg(unix)]
fn stat_from_metadata(meta: &fs::Metadata) -> StatRecord {
    use std::os::unix::fs::MetadataExt;
    StatRecord {
        dev: meta.dev() as u16,
        ino: meta.ino() as u16,
        mode: meta.mode(),
        nlink: meta.nlink() as u16,
        uid: meta.uid() as u16,
        gid: meta.gid() as u16,
        rdev: meta.rdev() as u16,
        size: meta.size() as u32,
        atime: (meta.atime(), meta.atime_nsec() as u32),
        mtime: (meta.mtime(), meta.mtime_nsec() as u32),
        ctime: (meta.ctime(), meta.ctime_nsec() as u32),
        blksize: meta.blksize() as u32,
        blocks: meta.blocks() as u32,
    }
}

#[cfg(not(unix))]
fn stat_from_metadata(meta: &fs::Metadata) -> StatRecord {
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| (d.as_secs() as i64, d.subsec_nanos()))
        .unwrap_or_default();
    let blksize = 512;
    StatRecord {
        mode: if meta.is_dir() { 0o040777 } else { 0o100666 },
        nlink: 1,
        size: meta.len() as u32,
        atime: mtime,
        mtime,
        ctime: mtime,
        blksize,
        blocks: (meta.len() as u32).div_ceil(blksize),
        ..Default::default()
    }
}

/// The host syscall bridge for one CPU.
pub struct Syscalls {
    terminate: bool,
    exit_code: u32,
    /// Guest fd → host file; 0..=2 are implicit stdio.
    files: HashMap<u32, File>,
    next_fd: u32,
}

impl Default for Syscalls {
    fn default() -> Self {
        Self::new()
    }
}

impl Syscalls {
    pub fn new() -> Self {
        Self {
            terminate: false,
            exit_code: 0,
            files: HashMap::new(),
            next_fd: 3,
        }
    }

    /// Clear the per-run state (open files survive across runs).
    pub fn clear(&mut self) {
        self.terminate = false;
        self.exit_code = 0;
    }

    /// True once the guest has called `exit`.
    pub fn terminated(&self) -> bool {
        self.terminate
    }

    /// The status passed to the last `exit` call.
    pub fn exit_code(&self) -> u32 {
        self.exit_code
    }

    /// Dispatch one trap-page routine.
    ///
    /// Only guest memory faults (bad path pointer, misaligned stat buffer)
    /// propagate as errors; host I/O failures turn into −1 results.
    pub fn dispatch(
        &mut self,
        routine_no: u32,
        regs: &mut [u32; NUM_REGS],
        ram: &mut Ram,
    ) -> Result<(), MemError> {
        if routine_no >= routines::COUNT {
            log::warn!("Ignoring unknown syscall routine {}", routine_no);
            return Ok(());
        }
        match routine_no {
            routines::EXIT => {
                self.terminate = true;
                self.exit_code = regs[1];
            }
            routines::PUTCHAR => {
                let c = regs[1] as u8;
                regs[1] = match io::stdout().write_all(&[c]) {
                    Ok(()) => c as u32,
                    Err(_) => ERR,
                };
            }
            routines::GETCHAR => {
                let mut byte = [0u8; 1];
                regs[1] = match io::stdin().read(&mut byte) {
                    Ok(1) => byte[0] as u32,
                    _ => ERR,
                };
            }
            routines::CLOSE => {
                let fd = regs[1];
                // stdin/stdout/stderr stay open; they belong to the
                // simulator.
                regs[1] = if fd <= 2 || self.files.remove(&fd).is_some() {
                    0
                } else {
                    ERR
                };
            }
            routines::FSTAT => {
                let (fd, buf) = (regs[1], regs[2]);
                let record = if fd <= 2 {
                    Some(StatRecord::char_device())
                } else {
                    self.files
                        .get(&fd)
                        .and_then(|f| f.metadata().ok())
                        .map(|m| stat_from_metadata(&m))
                };
                regs[1] = match record {
                    Some(rec) if ram.valid_range(buf, STAT_RECORD_SIZE) => {
                        rec.store(ram, buf)?;
                        0
                    }
                    _ => ERR,
                };
            }
            routines::ISATTY => {
                regs[1] = match regs[1] {
                    0 => io::stdin().is_terminal() as u32,
                    1 => io::stdout().is_terminal() as u32,
                    2 => io::stderr().is_terminal() as u32,
                    _ => 0,
                };
            }
            routines::LINK => {
                let old = self.path_from_guest(ram, regs[1])?;
                let new = self.path_from_guest(ram, regs[2])?;
                regs[1] = match fs::hard_link(&old, &new) {
                    Ok(()) => 0,
                    Err(_) => ERR,
                };
            }
            routines::LSEEK => {
                let (fd, offset, whence) = (regs[1], regs[2], regs[3]);
                let pos = match whence {
                    0 => SeekFrom::Start(offset as u64),
                    1 => SeekFrom::Current(offset as i32 as i64),
                    _ => SeekFrom::End(offset as i32 as i64),
                };
                regs[1] = match self.files.get_mut(&fd) {
                    Some(file) => file.seek(pos).map(|p| p as u32).unwrap_or(ERR),
                    None => ERR,
                };
            }
            routines::MKDIR => {
                let path = self.path_from_guest(ram, regs[1])?;
                regs[1] = match make_dir(&path, regs[2]) {
                    Ok(()) => 0,
                    Err(_) => ERR,
                };
            }
            routines::OPEN => {
                let path = self.path_from_guest(ram, regs[1])?;
                let flags = regs[2];
                regs[1] = match open_options(flags).open(&path) {
                    Ok(file) => {
                        let fd = self.next_fd;
                        self.next_fd += 1;
                        self.files.insert(fd, file);
                        fd
                    }
                    Err(_) => ERR,
                };
            }
            routines::READ => {
                let (fd, buf, nbytes) = (regs[1], regs[2], regs[3]);
                if !ram.valid_range(buf, nbytes) {
                    regs[1] = ERR;
                    return Ok(());
                }
                let slice = ram.slice_mut(buf, nbytes)?;
                let result = match fd {
                    0 => io::stdin().read(slice),
                    1 | 2 => Err(io::Error::from(io::ErrorKind::Unsupported)),
                    _ => match self.files.get_mut(&fd) {
                        Some(file) => file.read(slice),
                        None => Err(io::Error::from(io::ErrorKind::NotFound)),
                    },
                };
                regs[1] = result.map(|n| n as u32).unwrap_or(ERR);
            }
            routines::STAT => {
                let path = self.path_from_guest(ram, regs[1])?;
                let buf = regs[2];
                regs[1] = match fs::metadata(&path) {
                    Ok(meta) if ram.valid_range(buf, STAT_RECORD_SIZE) => {
                        stat_from_metadata(&meta).store(ram, buf)?;
                        0
                    }
                    _ => ERR,
                };
            }
            routines::UNLINK => {
                let path = self.path_from_guest(ram, regs[1])?;
                regs[1] = match fs::remove_file(&path) {
                    Ok(()) => 0,
                    Err(_) => ERR,
                };
            }
            routines::WRITE => {
                let (fd, buf, nbytes) = (regs[1], regs[2], regs[3]);
                if !ram.valid_range(buf, nbytes) {
                    regs[1] = ERR;
                    return Ok(());
                }
                let slice = ram.slice(buf, nbytes)?;
                let result = match fd {
                    0 => Err(io::Error::from(io::ErrorKind::Unsupported)),
                    1 => io::stdout().write(slice),
                    2 => io::stderr().write(slice),
                    _ => match self.files.get_mut(&fd) {
                        Some(file) => file.write(slice),
                        None => Err(io::Error::from(io::ErrorKind::NotFound)),
                    },
                };
                regs[1] = result.map(|n| n as u32).unwrap_or(ERR);
            }
            routines::GETTIMEMICROS => {
                let micros = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_micros() as u64)
                    .unwrap_or(0);
                regs[1] = micros as u32;
                regs[2] = (micros >> 32) as u32;
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    /// Copy a NUL-terminated guest string.
    fn path_from_guest(&self, ram: &Ram, mut addr: u32) -> Result<String, MemError> {
        let mut bytes = Vec::new();
        loop {
            let c = ram.load8(addr)?;
            if c == 0 {
                break;
            }
            bytes.push(c as u8);
            addr += 1;
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Map guest open flags onto host open options.
fn open_options(flags: u32) -> OpenOptions {
    let mut opts = OpenOptions::new();
    match flags & GUEST_O_ACCMODE {
        GUEST_O_WRONLY => opts.write(true),
        GUEST_O_RDWR => opts.read(true).write(true),
        _ => opts.read(true),
    };
    if flags & GUEST_O_APPEND != 0 {
        opts.append(true);
    }
    if flags & GUEST_O_CREAT != 0 {
        opts.create(true);
    }
    if flags & GUEST_O_TRUNC != 0 {
        opts.write(true).truncate(true);
    }
    opts
}

#[cfg(unix)]
fn make_dir(path: &str, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().mode(mode).create(Path::new(path))
}

#[cfg(not(unix))]
fn make_dir(path: &str, _mode: u32) -> io::Result<()> {
    fs::create_dir(Path::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_bridge() -> (Syscalls, Ram, [u32; NUM_REGS]) {
        (Syscalls::new(), Ram::new(0x10000), [0u32; NUM_REGS])
    }

    /// Write a NUL-terminated path string into guest RAM.
    fn put_path(ram: &mut Ram, addr: u32, path: &Path) {
        let bytes = path.to_str().unwrap().as_bytes();
        ram.slice_mut(addr, bytes.len() as u32)
            .unwrap()
            .copy_from_slice(bytes);
        ram.store8(addr + bytes.len() as u32, 0).unwrap();
    }

    #[test]
    fn test_exit_records_code() {
        let (mut sys, mut ram, mut regs) = make_bridge();
        regs[1] = 42;
        sys.dispatch(routines::EXIT, &mut regs, &mut ram).unwrap();
        assert!(sys.terminated());
        assert_eq!(sys.exit_code(), 42);

        sys.clear();
        assert!(!sys.terminated());
        assert_eq!(sys.exit_code(), 0);
    }

    #[test]
    fn test_unknown_routine_is_ignored() {
        let (mut sys, mut ram, mut regs) = make_bridge();
        regs[1] = 7;
        sys.dispatch(200, &mut regs, &mut ram).unwrap();
        assert_eq!(regs[1], 7);
        assert!(!sys.terminated());
    }

    #[test]
    fn test_putchar_returns_char() {
        let (mut sys, mut ram, mut regs) = make_bridge();
        regs[1] = b'\n' as u32;
        sys.dispatch(routines::PUTCHAR, &mut regs, &mut ram).unwrap();
        assert_eq!(regs[1], b'\n' as u32);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempdir().unwrap();
        let (mut sys, mut ram, mut regs) = make_bridge();
        put_path(&mut ram, 0x100, &dir.path().join("out.txt"));

        // open(path, CREAT | RDWR | TRUNC)
        regs[1] = 0x100;
        regs[2] = GUEST_O_RDWR | GUEST_O_CREAT | GUEST_O_TRUNC;
        regs[3] = 0o644;
        sys.dispatch(routines::OPEN, &mut regs, &mut ram).unwrap();
        let fd = regs[1];
        assert!(fd >= 3);

        // write(fd, buf, 5)
        ram.slice_mut(0x200, 5).unwrap().copy_from_slice(b"mrisc");
        regs[1] = fd;
        regs[2] = 0x200;
        regs[3] = 5;
        sys.dispatch(routines::WRITE, &mut regs, &mut ram).unwrap();
        assert_eq!(regs[1], 5);

        // lseek(fd, 0, SEEK_SET)
        regs[1] = fd;
        regs[2] = 0;
        regs[3] = 0;
        sys.dispatch(routines::LSEEK, &mut regs, &mut ram).unwrap();
        assert_eq!(regs[1], 0);

        // read(fd, buf2, 5)
        regs[1] = fd;
        regs[2] = 0x300;
        regs[3] = 5;
        sys.dispatch(routines::READ, &mut regs, &mut ram).unwrap();
        assert_eq!(regs[1], 5);
        assert_eq!(ram.slice(0x300, 5).unwrap(), b"mrisc");

        // close(fd) succeeds once.
        regs[1] = fd;
        sys.dispatch(routines::CLOSE, &mut regs, &mut ram).unwrap();
        assert_eq!(regs[1], 0);
        regs[1] = fd;
        sys.dispatch(routines::CLOSE, &mut regs, &mut ram).unwrap();
        assert_eq!(regs[1], ERR);
    }

    #[test]
    fn test_invalid_buffer_returns_minus_one() {
        let (mut sys, mut ram, mut regs) = make_bridge();
        regs[1] = 1; // stdout
        regs[2] = 0xff00_0000; // way outside RAM
        regs[3] = 16;
        sys.dispatch(routines::WRITE, &mut regs, &mut ram).unwrap();
        assert_eq!(regs[1], ERR);

        regs[1] = 0;
        regs[2] = 0xff00_0000;
        regs[3] = 16;
        sys.dispatch(routines::READ, &mut regs, &mut ram).unwrap();
        assert_eq!(regs[1], ERR);
    }

    #[test]
    fn test_stat_record_layout() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("stat_me");
        fs::write(&file_path, b"0123456789").unwrap();

        let (mut sys, mut ram, mut regs) = make_bridge();
        put_path(&mut ram, 0x100, &file_path);
        regs[1] = 0x100;
        regs[2] = 0x400;
        sys.dispatch(routines::STAT, &mut regs, &mut ram).unwrap();
        assert_eq!(regs[1], 0);
        // size at offset 16.
        assert_eq!(ram.load32(0x410).unwrap(), 10);
        // mode at offset 4 marks a regular file.
        assert_eq!(ram.load32(0x404).unwrap() & 0o170000, 0o100000);
    }

    #[test]
    fn test_fstat_stdio_is_char_device() {
        let (mut sys, mut ram, mut regs) = make_bridge();
        regs[1] = 1;
        regs[2] = 0x400;
        sys.dispatch(routines::FSTAT, &mut regs, &mut ram).unwrap();
        assert_eq!(regs[1], 0);
        assert_eq!(ram.load32(0x404).unwrap() & 0o170000, 0o020000);
    }

    #[test]
    fn test_mkdir_unlink() {
        let dir = tempdir().unwrap();
        let (mut sys, mut ram, mut regs) = make_bridge();

        put_path(&mut ram, 0x100, &dir.path().join("subdir"));
        regs[1] = 0x100;
        regs[2] = 0o755;
        sys.dispatch(routines::MKDIR, &mut regs, &mut ram).unwrap();
        assert_eq!(regs[1], 0);
        assert!(dir.path().join("subdir").is_dir());

        let file_path = dir.path().join("victim");
        fs::write(&file_path, b"x").unwrap();
        put_path(&mut ram, 0x200, &file_path);
        regs[1] = 0x200;
        sys.dispatch(routines::UNLINK, &mut regs, &mut ram).unwrap();
        assert_eq!(regs[1], 0);
        assert!(!file_path.exists());

        // Unlinking again fails with -1.
        regs[1] = 0x200;
        sys.dispatch(routines::UNLINK, &mut regs, &mut ram).unwrap();
        assert_eq!(regs[1], ERR);
    }

    #[test]
    fn test_link_creates_hard_link() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("orig");
        fs::write(&original, b"data").unwrap();

        let (mut sys, mut ram, mut regs) = make_bridge();
        put_path(&mut ram, 0x100, &original);
        put_path(&mut ram, 0x200, &dir.path().join("alias"));
        regs[1] = 0x100;
        regs[2] = 0x200;
        sys.dispatch(routines::LINK, &mut regs, &mut ram).unwrap();
        assert_eq!(regs[1], 0);
        assert_eq!(fs::read(dir.path().join("alias")).unwrap(), b"data");
    }

    #[test]
    fn test_gettimemicros_is_monotonic_enough() {
        let (mut sys, mut ram, mut regs) = make_bridge();
        sys.dispatch(routines::GETTIMEMICROS, &mut regs, &mut ram)
            .unwrap();
        let t = ((regs[2] as u64) << 32) | regs[1] as u64;
        // Sometime after 2020-01-01 in microseconds.
        assert!(t > 1_577_836_800_000_000);
    }

    #[test]
    fn test_bad_path_pointer_is_fatal() {
        let (mut sys, mut ram, mut regs) = make_bridge();
        regs[1] = 0xdead_0000;
        let err = sys.dispatch(routines::UNLINK, &mut regs, &mut ram);
        assert!(err.is_err());
    }
}
