//! Binary execution trace writer.
//!
//! The trace file is a flat sequence of 20-byte little-endian records:
//!
//! ```text
//! { flags: u32, pc: u32, src_a: u32, src_b: u32, src_c: u32 }
//! ```
//!
//! Flag bits: 0 = record valid, 1/2/3 = src_a/b/c fields valid. Vector
//! instructions emit one record per lane. Records are buffered and written
//! in batches of 128 for throughput; the buffer is flushed when full and
//! when the writer is dropped.

use byteorder::{ByteOrder, LittleEndian};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Number of records held before writing to the file.
const FLUSH_INTERVAL: usize = 128;
/// On-disk size of one record.
const RECORD_SIZE: usize = 20;

/// One trace record, built up across the decode and register-read stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceRecord {
    pub valid: bool,
    pub src_a_valid: bool,
    pub src_b_valid: bool,
    pub src_c_valid: bool,
    pub pc: u32,
    pub src_a: u32,
    pub src_b: u32,
    pub src_c: u32,
}

/// Buffered writer for the binary trace format.
pub struct TraceWriter {
    file: File,
    buf: [u8; FLUSH_INTERVAL * RECORD_SIZE],
    entries: usize,
}

impl TraceWriter {
    /// Create (truncate) the trace file.
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self {
            file: File::create(path)?,
            buf: [0; FLUSH_INTERVAL * RECORD_SIZE],
            entries: 0,
        })
    }

    /// Append one record; invalid records are dropped.
    pub fn append(&mut self, rec: &TraceRecord) -> io::Result<()> {
        if !rec.valid {
            return Ok(());
        }

        let entry = &mut self.buf[self.entries * RECORD_SIZE..(self.entries + 1) * RECORD_SIZE];
        self.entries += 1;

        let flags = (rec.valid as u32)
            | ((rec.src_a_valid as u32) << 1)
            | ((rec.src_b_valid as u32) << 2)
            | ((rec.src_c_valid as u32) << 3);
        LittleEndian::write_u32(&mut entry[0..4], flags);
        LittleEndian::write_u32(&mut entry[4..8], rec.pc);
        LittleEndian::write_u32(&mut entry[8..12], if rec.src_a_valid { rec.src_a } else { 0 });
        LittleEndian::write_u32(&mut entry[12..16], if rec.src_b_valid { rec.src_b } else { 0 });
        LittleEndian::write_u32(&mut entry[16..20], if rec.src_c_valid { rec.src_c } else { 0 });

        if self.entries >= FLUSH_INTERVAL {
            self.flush()?;
        }
        Ok(())
    }

    /// Write out any buffered records.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.entries > 0 {
            self.file.write_all(&self.buf[..self.entries * RECORD_SIZE])?;
            self.file.flush()?;
            self.entries = 0;
        }
        Ok(())
    }
}

impl Drop for TraceWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("Failed to flush trace buffer: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_record(pc: u32) -> TraceRecord {
        TraceRecord {
            valid: true,
            src_a_valid: true,
            src_b_valid: false,
            src_c_valid: true,
            pc,
            src_a: 0x1111_1111,
            src_b: 0x2222_2222,
            src_c: 0x3333_3333,
        }
    }

    #[test]
    fn test_record_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.bin");
        {
            let mut w = TraceWriter::create(&path).unwrap();
            w.append(&make_record(0x200)).unwrap();
        }
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(LittleEndian::read_u32(&bytes[0..4]), 0b1011);
        assert_eq!(LittleEndian::read_u32(&bytes[4..8]), 0x200);
        assert_eq!(LittleEndian::read_u32(&bytes[8..12]), 0x1111_1111);
        // An invalid source field stays zero.
        assert_eq!(LittleEndian::read_u32(&bytes[12..16]), 0);
        assert_eq!(LittleEndian::read_u32(&bytes[16..20]), 0x3333_3333);
    }

    #[test]
    fn test_invalid_records_are_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.bin");
        {
            let mut w = TraceWriter::create(&path).unwrap();
            w.append(&TraceRecord::default()).unwrap();
        }
        assert_eq!(std::fs::read(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_batched_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.bin");
        let mut w = TraceWriter::create(&path).unwrap();
        for pc in 0..(FLUSH_INTERVAL as u32) {
            w.append(&make_record(pc * 4)).unwrap();
        }
        // A full batch is written without an explicit flush.
        assert_eq!(
            std::fs::read(&path).unwrap().len(),
            FLUSH_INTERVAL * RECORD_SIZE
        );

        // Partial batches appear on drop.
        w.append(&make_record(0x1000)).unwrap();
        drop(w);
        assert_eq!(
            std::fs::read(&path).unwrap().len(),
            (FLUSH_INTERVAL + 1) * RECORD_SIZE
        );
    }
}
