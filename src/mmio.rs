//! MC1-style memory-mapped I/O window.
//!
//! A 64-byte register block at [`MMIO_BASE`] mirrors the hardware-facing
//! fields of an MC1 computer, plus a 16-slot key event ring at
//! `MMIO_BASE + 0x80`. The CPU core itself only ever writes CLKCNT; the
//! remaining fields are written by the front-end (hardware description,
//! program setup) or by an external presenter (frame counter, input events)
//! and polled by the guest.
//!
//! The window is optional: everything here is a no-op when the configured
//! RAM does not reach `MMIO_BASE`.

use crate::ram::Ram;

/// Start of the MMIO register window.
pub const MMIO_BASE: u32 = 0xc000_0000;

/// Size of the MMIO register window in bytes.
pub const MMIO_SIZE: u32 = 64;

/// Cycle counter, low 32 bits. Written by the CPU every cycle.
pub const CLKCNTLO: u32 = 0;
/// CPU clock frequency in Hz.
pub const CPUCLK: u32 = 8;
/// Video RAM size in bytes.
pub const VRAMSIZE: u32 = 12;
/// Cycle counter, high 32 bits. Written by the CPU every cycle.
pub const CLKCNTHI: u32 = 16;
/// Native video width in pixels.
pub const VIDWIDTH: u32 = 20;
/// Native video height in pixels.
pub const VIDHEIGHT: u32 = 24;
/// Video refresh rate (16.16 fixed point).
pub const VIDFPS: u32 = 28;
/// Frame counter, written by the presenter.
pub const VIDFRAMENO: u32 = 0x20;
/// Key event sequence number.
pub const KEYPTR: u32 = 0x30;
/// Mouse position (x in bits 0-15, y in bits 16-31).
pub const MOUSEPOS: u32 = 0x34;
/// Mouse button mask (bit 0 = left, 1 = middle, 2 = right).
pub const MOUSEBTNS: u32 = 0x38;
/// Board switches.
pub const SWITCHES: u32 = 40;

/// Start of the key event ring buffer.
pub const KEYBUF: u32 = 0x80;
/// Number of slots in the key event ring.
pub const KEYBUF_SLOTS: u32 = 16;

/// Key press flag in a key event word (bits 0-8 hold the scancode).
pub const KEY_PRESSED: u32 = 0x8000_0000;

/// True if the RAM is large enough to hold the MMIO window.
#[inline]
pub fn present(ram: &Ram) -> bool {
    ram.valid_range(MMIO_BASE, MMIO_SIZE)
}

/// Populate the constant hardware-description fields.
///
/// Mirrors what MC1 boot firmware would expose to the guest. Does nothing
/// when the RAM does not cover the window.
pub fn seed(ram: &mut Ram) {
    if !present(ram) {
        return;
    }
    // Infallible: present() already validated the window.
    let _ = ram.store32(MMIO_BASE + CPUCLK, 70_000_000);
    let _ = ram.store32(MMIO_BASE + VRAMSIZE, 128 * 1024);
    let _ = ram.store32(MMIO_BASE + VIDWIDTH, 1920);
    let _ = ram.store32(MMIO_BASE + VIDHEIGHT, 1080);
    let _ = ram.store32(MMIO_BASE + VIDFPS, 60 * 65536);
    let _ = ram.store32(MMIO_BASE + SWITCHES, 4);
}

/// Publish a key event into the ring and bump KEYPTR.
///
/// `event_count` is the presenter's running event counter; the slot index is
/// `event_count % 16`. Set `pressed` for key-down and repeat events.
pub fn push_key_event(ram: &mut Ram, event_count: u32, scancode: u32, pressed: bool) {
    if !present(ram) {
        return;
    }
    let keycode = if pressed {
        scancode | KEY_PRESSED
    } else {
        scancode
    };
    let _ = ram.store32(MMIO_BASE + KEYBUF + 4 * (event_count % KEYBUF_SLOTS), keycode);
    let _ = ram.store32(MMIO_BASE + KEYPTR, event_count);
}

/// Publish the mouse position.
pub fn set_mouse_pos(ram: &mut Ram, x: u32, y: u32) {
    if !present(ram) {
        return;
    }
    let _ = ram.store32(MMIO_BASE + MOUSEPOS, (x & 0xffff) | (y << 16));
}

/// Publish the mouse button mask.
pub fn set_mouse_buttons(ram: &mut Ram, buttons: u32) {
    if !present(ram) {
        return;
    }
    let _ = ram.store32(MMIO_BASE + MOUSEBTNS, buttons);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_mmio_ram() -> Ram {
        Ram::new(MMIO_BASE as u64 + 0x1000)
    }

    #[test]
    fn test_seed_populates_fields() {
        let mut ram = make_mmio_ram();
        seed(&mut ram);
        assert_eq!(ram.load32(MMIO_BASE + CPUCLK).unwrap(), 70_000_000);
        assert_eq!(ram.load32(MMIO_BASE + VIDWIDTH).unwrap(), 1920);
        assert_eq!(ram.load32(MMIO_BASE + VIDHEIGHT).unwrap(), 1080);
        assert_eq!(ram.load32(MMIO_BASE + SWITCHES).unwrap(), 4);
    }

    #[test]
    fn test_seed_without_window_is_noop() {
        let mut ram = Ram::new(0x1000);
        assert!(!present(&ram));
        seed(&mut ram);
    }

    #[test]
    fn test_key_event_ring() {
        let mut ram = make_mmio_ram();

        push_key_event(&mut ram, 1, 0x1c, true);
        assert_eq!(ram.load32(MMIO_BASE + KEYPTR).unwrap(), 1);
        assert_eq!(
            ram.load32(MMIO_BASE + KEYBUF + 4).unwrap(),
            0x1c | KEY_PRESSED
        );

        push_key_event(&mut ram, 2, 0x1c, false);
        assert_eq!(ram.load32(MMIO_BASE + KEYBUF + 8).unwrap(), 0x1c);

        // Slot 17 wraps onto slot 1.
        push_key_event(&mut ram, 17, 0x32, true);
        assert_eq!(
            ram.load32(MMIO_BASE + KEYBUF + 4).unwrap(),
            0x32 | KEY_PRESSED
        );
        assert_eq!(ram.load32(MMIO_BASE + KEYPTR).unwrap(), 17);
    }

    #[test]
    fn test_mouse_fields() {
        let mut ram = make_mmio_ram();
        set_mouse_pos(&mut ram, 640, 400);
        assert_eq!(ram.load32(MMIO_BASE + MOUSEPOS).unwrap(), 640 | (400 << 16));
        set_mouse_buttons(&mut ram, 0b101);
        assert_eq!(ram.load32(MMIO_BASE + MOUSEBTNS).unwrap(), 0b101);
    }
}
