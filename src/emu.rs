//! Engine: the top-level orchestrator. Owns the CPU, the MIU and everything
//! mapped into it, and the debugger; drives ROM loading, the fixed-rate
//! frame loop, and the fatal-fault channel the host observes on an ERROR
//! transition.

use crate::config;
use crate::cpu::decode::{self, Instr};
use crate::cpu::Cpu;
use crate::debugger::Debugger;
use crate::error::CoreError;
use crate::miu::Miu;
use crate::peripherals::Peripherals;
use crate::region::{ArrayRegion, MmioRegion, Region};

/// Fixed scan-out surface size; matches the VDU's own target dimensions.
pub const SCREEN_WIDTH: usize = crate::peripherals::vdu::TARGET_WIDTH;
pub const SCREEN_HEIGHT: usize = crate::peripherals::vdu::TARGET_HEIGHT;

/// Coarse machine state a host shell polls between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Loading,
    Paused,
    Running,
    Error,
}

/// Everything the host needs to show a useful crash report: the faulting
/// PC, a message, and a window of memory around the fault for a hex dump.
#[derive(Debug, Clone)]
pub struct FatalReport {
    pub pc: u32,
    pub message: String,
    pub memory_snapshot: Vec<u8>,
}

const FATAL_SNAPSHOT_LEN: u32 = 256;
const FATAL_SNAPSHOT_LEAD: u32 = 16;

/// Reverse the byte order of every 4-byte word in `bytes` in place. Used to
/// convert a big-endian ROM image into this core's little-endian read path.
fn byte_swap_words(bytes: &mut [u8]) {
    for chunk in bytes.chunks_mut(4) {
        if chunk.len() == 4 {
            chunk.swap(0, 3);
            chunk.swap(1, 2);
        }
    }
}

fn read_word_le(bytes: &[u8], offset: usize) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(arr)
}

/// Whether `word` decodes to something other than the invalid-instruction
/// trap. The compact-pair range (OP 0x18..0x1F) never produces an invalid
/// 16-bit half, so it is always considered valid here.
fn opcode_is_valid(word: u32) -> bool {
    let op = (word >> 27) & 0x1F;
    if (0x18..=0x1F).contains(&op) {
        let lo = decode::decode16((word & 0xFFFF) as u16);
        let hi = decode::decode16(((word >> 16) & 0xFFFF) as u16);
        lo != Instr::Invalid && hi != Instr::Invalid
    } else {
        decode::decode32(word) != Instr::Invalid
    }
}

/// Whether the `aM82` big-endian magic is present at its fixed offset.
fn has_magic_signature(bytes: &[u8]) -> bool {
    let end = config::rom::MAGIC_OFFSET + 4;
    if bytes.len() < end {
        return false;
    }
    let mut arr = [0u8; 4];
    arr.copy_from_slice(&bytes[config::rom::MAGIC_OFFSET..end]);
    u32::from_be_bytes(arr) == config::rom::MAGIC_VALUE
}

/// The S+core machine: CPU, address space, peripherals, and debugger, run
/// one frame (or one instruction) at a time by the host.
pub struct Engine {
    cpu: Cpu,
    miu: Miu,
    debugger: Debugger,
    state: EngineState,
    framebuffer: Vec<u32>,
    frame_count: u64,
    last_fatal: Option<FatalReport>,
    entry_pc: u32,
    rom_loaded: bool,
}

impl Engine {
    pub fn new() -> Self {
        let mut miu = Miu::new();
        miu.set_region(
            config::segment::FLASH,
            Box::new(ArrayRegion::new(config::size::FLASH)),
            "flash",
        );
        miu.set_region(
            config::segment::DRAM,
            Box::new(ArrayRegion::new(config::size::DRAM)),
            "dram",
        );
        miu.set_region(
            config::segment::IO,
            Box::new(MmioRegion::new(config::size::IO, Box::new(Peripherals::new()))),
            "io",
        );
        Self {
            cpu: Cpu::new(),
            miu,
            debugger: Debugger::new(),
            state: EngineState::Stopped,
            framebuffer: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
            frame_count: 0,
            last_fatal: None,
            entry_pc: config::rom::ENTRY_DEFAULT,
            rom_loaded: false,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn miu_mut(&mut self) -> &mut Miu {
        &mut self.miu
    }

    pub fn debugger_mut(&mut self) -> &mut Debugger {
        &mut self.debugger
    }

    pub fn framebuffer(&self) -> &[u32] {
        &self.framebuffer
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn last_fatal(&self) -> Option<&FatalReport> {
        self.last_fatal.as_ref()
    }

    /// Reach through the IO segment's `MmioRegion` to the concrete
    /// `Peripherals` it wraps. Takes the region out of the MIU for the
    /// duration of the closure so callers that also need `&mut Miu` (e.g.
    /// the VDU's DRAM scan-out) don't run into two live mutable borrows of
    /// the same MIU at once; the region is always put back before returning.
    fn with_peripherals<R>(&mut self, f: impl FnOnce(&mut Peripherals, &mut Miu) -> R) -> R {
        let mut region = self
            .miu
            .take_region(config::segment::IO)
            .expect("io segment is always mapped");
        let result = {
            let mmio = region
                .as_any_mut()
                .downcast_mut::<MmioRegion>()
                .expect("io segment is always backed by an MmioRegion");
            let peripherals = mmio
                .handler_any_mut()
                .downcast_mut::<Peripherals>()
                .expect("io segment handler is always Peripherals");
            f(peripherals, &mut self.miu)
        };
        self.miu.set_region(config::segment::IO, region, "io");
        result
    }

    fn flash_region_mut(&mut self) -> &mut ArrayRegion {
        self.miu
            .region_mut(config::segment::FLASH)
            .and_then(|region| region.as_any_mut().downcast_mut::<ArrayRegion>())
            .expect("flash segment is always an ArrayRegion")
    }

    /// Host-side API: push a byte into the UART's RX FIFO.
    pub fn uart_enqueue_rx(&mut self, byte: u8) {
        self.with_peripherals(|p, _| p.uart.enqueue_rx(byte));
    }

    /// Host-side API: drain every byte transmitted by the UART since the
    /// last call.
    pub fn uart_drain_tx(&mut self) -> Vec<u8> {
        self.with_peripherals(|p, _| p.uart.drain_tx())
    }

    /// Validate and install a ROM image, auto-detecting byte order and the
    /// `aM82` magic entry point, then reset to it. Leaves the engine Paused
    /// on success and Stopped on rejection.
    pub fn load_rom(&mut self, data: &[u8]) -> Result<(), CoreError> {
        if data.is_empty() {
            return Err(CoreError::InvalidRom {
                reason: "ROM image is empty".to_string(),
            });
        }
        if data.len() > config::rom::MAX_SIZE {
            return Err(CoreError::InvalidRom {
                reason: format!(
                    "ROM image of {} bytes exceeds the {}-byte flash capacity",
                    data.len(),
                    config::rom::MAX_SIZE
                ),
            });
        }

        self.state = EngineState::Loading;

        let magic = has_magic_signature(data);
        let entry_offset = if magic {
            (config::rom::ENTRY_MAGIC - config::rom::ENTRY_DEFAULT) as usize
        } else {
            0
        };
        if data.len() < entry_offset + 4 {
            self.state = EngineState::Stopped;
            return Err(CoreError::InvalidRom {
                reason: "ROM image is too small to contain an entry instruction".to_string(),
            });
        }

        let mut bytes = data.to_vec();
        let mut swapped = false;
        if !opcode_is_valid(read_word_le(&bytes, entry_offset)) {
            let le_op = read_word_le(&bytes, entry_offset) >> 27;
            byte_swap_words(&mut bytes);
            swapped = true;
            if !opcode_is_valid(read_word_le(&bytes, entry_offset)) {
                let be_op = read_word_le(&bytes, entry_offset) >> 27;
                log::warn!(
                    "engine: rejecting ROM, neither byte order decodes at entry (le_op={le_op:#04x}, be_op={be_op:#04x})"
                );
                self.state = EngineState::Stopped;
                return Err(CoreError::InvalidRom {
                    reason: "entry instruction does not decode under either byte order".to_string(),
                });
            }
        }

        log::info!(
            "engine: loaded {} byte ROM ({}endian, magic={magic})",
            data.len(),
            if swapped { "big-" } else { "little-" }
        );

        let entry_pc = if magic {
            config::rom::ENTRY_MAGIC
        } else {
            config::rom::ENTRY_DEFAULT
        };

        {
            let flash = self.flash_region_mut();
            flash.set_read_only(false);
            flash.load(0, &bytes);
            flash.set_read_only(true);
        }

        self.entry_pc = entry_pc;
        self.rom_loaded = true;
        self.reset_internal(entry_pc);
        self.state = EngineState::Paused;
        Ok(())
    }

    fn reset_internal(&mut self, entry_pc: u32) {
        self.cpu.reset(entry_pc);
        self.with_peripherals(|p, _| p.reset());
        self.miu.reset_unmapped_counter();
        self.framebuffer.iter_mut().for_each(|p| *p = 0);
        self.frame_count = 0;
        self.last_fatal = None;
    }

    /// Reset to the last loaded ROM's entry point, or to the default entry
    /// PC with an unloaded (Stopped) machine if none has been loaded yet.
    pub fn reset(&mut self) {
        if self.rom_loaded {
            self.reset_internal(self.entry_pc);
            self.state = EngineState::Paused;
        } else {
            self.reset_internal(config::rom::ENTRY_DEFAULT);
            self.state = EngineState::Stopped;
        }
    }

    pub fn start(&mut self) {
        if self.rom_loaded && self.state != EngineState::Error {
            self.state = EngineState::Running;
        }
    }

    pub fn pause(&mut self) {
        if self.state == EngineState::Running {
            self.state = EngineState::Paused;
        }
    }

    /// Execute exactly one instruction. Only has an effect while Paused, so
    /// a host debugger can single-step without first stopping a running
    /// machine out from under itself.
    pub fn step_one(&mut self) {
        if self.state != EngineState::Paused {
            return;
        }
        let pc = self.cpu.pc();
        if self.debugger.is_attached() {
            self.debugger.record_pc(pc);
        }
        self.cpu.step(&mut self.miu);
    }

    /// Run up to one frame's worth of cycles in fixed slices, ticking
    /// peripherals and delivering any interrupt they raise between slices,
    /// then scan out the frame and signal vblank. A no-op unless Running.
    pub fn run_frame(&mut self) {
        if self.state != EngineState::Running {
            return;
        }

        self.with_peripherals(|p, _| p.vdu.clear_vblank());

        let mut frame_remaining: i64 = config::CYCLES_PER_FRAME as i64;
        while frame_remaining > 0 {
            let slice_budget = (config::CYCLES_PER_SLICE as i64).min(frame_remaining);
            let slice_start_cycles = self.cpu.cycles;
            let mut slice_remaining = slice_budget;

            while slice_remaining > 0 {
                let pc = self.cpu.pc();
                if self.debugger.is_attached() {
                    if self.debugger.should_break(pc) {
                        self.state = EngineState::Paused;
                        return;
                    }
                    self.debugger.record_pc(pc);
                }
                self.cpu.step(&mut self.miu);
                slice_remaining -= config::CYCLES_PER_INSTRUCTION as i64;
                if slice_remaining <= config::SLICE_OVERRUN_LIMIT {
                    let _ = self.fail(pc, "slice cycle budget overrun without reaching the next maintenance tick");
                    return;
                }
            }

            let slice_cycles = (self.cpu.cycles - slice_start_cycles) as u32;
            let raise = self.with_peripherals(|p, _| p.tick(slice_cycles));
            if let Some(outcome) = raise {
                if outcome.delivered {
                    self.cpu.raise_interrupt(outcome.line);
                }
            }

            frame_remaining -= slice_budget;
        }

        let mut framebuffer = std::mem::take(&mut self.framebuffer);
        let (_render, raise) = self.with_peripherals(|p, miu| p.render_frame(miu, &mut framebuffer));
        self.framebuffer = framebuffer;
        if raise.delivered {
            self.cpu.raise_interrupt(raise.line);
        }

        self.frame_count += 1;
    }

    /// Force the engine into the ERROR state, recording a fault report with
    /// a memory window centered (as far as the address space allows) on
    /// `pc`.
    pub fn fail(&mut self, pc: u32, message: impl Into<String>) -> CoreError {
        let message = message.into();
        let memory_snapshot = self.memory_snapshot_around(pc);
        self.last_fatal = Some(FatalReport {
            pc,
            message: message.clone(),
            memory_snapshot,
        });
        self.state = EngineState::Error;
        CoreError::Interpreter { pc, message }
    }

    fn memory_snapshot_around(&mut self, pc: u32) -> Vec<u8> {
        let start = pc.wrapping_sub(FATAL_SNAPSHOT_LEAD);
        (0..FATAL_SNAPSHOT_LEN)
            .map(|i| self.miu.read8(start.wrapping_add(i)))
            .collect()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
