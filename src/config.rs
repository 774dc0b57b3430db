//! Fixed constants describing the emulated machine.
//!
//! The core has no external configuration file or CLI; everything it needs
//! to know about timing and the address map is a compile-time constant,
//! collected here instead of scattered as magic numbers through the engine
//! and MIU.

/// Nominal S+core CPU clock, in Hz.
pub const CPU_HZ: u64 = 33_868_800;

/// Target display refresh rate, in frames per second.
pub const TARGET_FPS: u32 = 60;

/// CPU cycles retired per rendered frame at `TARGET_FPS`.
pub const CYCLES_PER_FRAME: u32 = 564_480;

/// CPU cycles between peripheral maintenance ticks within a frame.
pub const CYCLES_PER_SLICE: u32 = 10_000;

/// Flat cycle charge per instruction (see the CPU core's step dispatch).
pub const CYCLES_PER_INSTRUCTION: u32 = 4;

/// Safety bound: if cycles-remaining in a frame's slice loop drops below
/// this (as a negative number), the loop aborts rather than spin forever.
pub const SLICE_OVERRUN_LIMIT: i64 = -10_000;

/// Address-space segment indices (top byte of a 32-bit address).
pub mod segment {
    /// Memory-mapped I/O (timer/INTC/UART/VDU), nominal 256 KiB.
    pub const IO: u8 = 0x08;
    /// Flash ROM, 8 MiB.
    pub const FLASH: u8 = 0x9E;
    /// DRAM, 16 MiB; the default framebuffer lives at the base of this segment.
    pub const DRAM: u8 = 0xA0;
}

/// Byte sizes of the three principal backing regions.
pub mod size {
    /// Flash ROM capacity.
    pub const FLASH: usize = 8 * 1024 * 1024;
    /// DRAM capacity.
    pub const DRAM: usize = 16 * 1024 * 1024;
    /// Nominal I/O window capacity (sparse, word-handler based).
    pub const IO: usize = 256 * 1024;
}

/// Offsets (relative to the I/O segment base) of the peripheral windows.
pub mod io_offset {
    /// Interrupt controller + timer block window start.
    pub const TIMER_INTC_BASE: u32 = 0x000A_0000;
    /// UART window start.
    pub const UART_BASE: u32 = 0x000B_0000;
    /// VDU window start.
    pub const VDU_BASE: u32 = 0x000C_0000;

    /// Interrupt controller base, relative to `TIMER_INTC_BASE`.
    pub const INTC: u32 = 0x0000;
    /// Timer block base, relative to `TIMER_INTC_BASE`.
    pub const TIMER: u32 = 0x0010;
}

/// Default ROM load addresses and the big-endian magic signature.
pub mod rom {
    /// Default entry PC (no magic signature present).
    pub const ENTRY_DEFAULT: u32 = 0x9E00_0000;
    /// Entry PC selected when the `aM82` magic is present at offset 0x4E.
    pub const ENTRY_MAGIC: u32 = 0x9E00_0100;
    /// Byte offset of the optional magic signature within the ROM image.
    pub const MAGIC_OFFSET: usize = 0x4E;
    /// Big-endian 32-bit value of the magic signature (`aM82`).
    pub const MAGIC_VALUE: u32 = 0x614D_3832;
    /// Maximum accepted ROM image size.
    pub const MAX_SIZE: usize = super::size::FLASH;
}
