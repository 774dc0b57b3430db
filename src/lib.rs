//! SPG290 / S+core interpreter core
//!
//! This crate provides a platform-agnostic emulator core with a stable C ABI.
//! No OS APIs are used - all I/O is done through byte buffers.
//!
//! # Architecture
//!
//! The emulator is organized into several modules:
//! - `config`: timing and memory-map constants shared across the core
//! - `region` / `miu`: the segment-addressed memory interface and the
//!   region traits (flat array, memory-mapped handler) that plug into it
//! - `peripherals`: interrupt controller, timer block, UART, VDU
//! - `cpu`: S+core register file, decoder, and instruction execution
//! - `debugger`: breakpoints, watchpoints, and execution history
//! - `emu`: the `Engine` orchestrator
//!
//! # Memory Map (32-bit address space, top byte selects the segment)
//!
//! | Segment | Region                    |
//! |---------|---------------------------|
//! | 0x08    | Memory-mapped I/O         |
//! | 0x9E    | Flash (ROM image)         |
//! | 0xA0    | DRAM (work RAM + VRAM)    |
//! | other   | Unmapped                  |

pub mod config;
pub mod cpu;
pub mod debugger;
pub mod disasm;
pub mod error;
mod emu;
pub mod miu;
pub mod peripherals;
pub mod region;

#[cfg(feature = "wasm")]
pub mod wasm;

use std::ptr;
use std::slice;

pub use emu::{Engine, EngineState, FatalReport, SCREEN_HEIGHT, SCREEN_WIDTH};

/// Create a new engine instance. Never returns null; allocation failure
/// aborts the process the same way any other Rust `Box` allocation would.
#[no_mangle]
pub extern "C" fn engine_create() -> *mut Engine {
    Box::into_raw(Box::new(Engine::new()))
}

/// Destroy an engine instance. Safe to call with a null pointer.
#[no_mangle]
pub extern "C" fn engine_destroy(engine: *mut Engine) {
    if !engine.is_null() {
        unsafe {
            drop(Box::from_raw(engine));
        }
    }
}

/// Load a ROM image. Returns 0 on success, -1 on a null pointer, -2 if the
/// image failed validation (see `error::CoreError::InvalidRom`).
#[no_mangle]
pub extern "C" fn engine_load_rom(engine: *mut Engine, data: *const u8, len: usize) -> i32 {
    if engine.is_null() || data.is_null() {
        return -1;
    }

    let engine = unsafe { &mut *engine };
    let rom_data = unsafe { slice::from_raw_parts(data, len) };

    match engine.load_rom(rom_data) {
        Ok(()) => 0,
        Err(err) => {
            log::warn!("engine_load_rom: {err}");
            -2
        }
    }
}

/// Reset to the last loaded ROM's entry point (or to an unloaded, Stopped
/// machine if none has been loaded).
#[no_mangle]
pub extern "C" fn engine_reset(engine: *mut Engine) {
    if engine.is_null() {
        return;
    }
    unsafe { &mut *engine }.reset();
}

/// Transition a loaded, non-faulted engine to Running.
#[no_mangle]
pub extern "C" fn engine_start(engine: *mut Engine) {
    if engine.is_null() {
        return;
    }
    unsafe { &mut *engine }.start();
}

/// Transition a Running engine back to Paused.
#[no_mangle]
pub extern "C" fn engine_pause(engine: *mut Engine) {
    if engine.is_null() {
        return;
    }
    unsafe { &mut *engine }.pause();
}

/// Execute exactly one instruction. Only has an effect while Paused.
#[no_mangle]
pub extern "C" fn engine_step(engine: *mut Engine) {
    if engine.is_null() {
        return;
    }
    unsafe { &mut *engine }.step_one();
}

/// Run up to one frame's worth of cycles. Only has an effect while Running;
/// the host is expected to call this once per vsync.
#[no_mangle]
pub extern "C" fn engine_run_frame(engine: *mut Engine) {
    if engine.is_null() {
        return;
    }
    unsafe { &mut *engine }.run_frame();
}

/// Coarse machine state, encoded as: 0 Stopped, 1 Loading, 2 Paused,
/// 3 Running, 4 Error. Returns -1 for a null pointer.
#[no_mangle]
pub extern "C" fn engine_state(engine: *const Engine) -> i32 {
    if engine.is_null() {
        return -1;
    }
    match unsafe { &*engine }.state() {
        EngineState::Stopped => 0,
        EngineState::Loading => 1,
        EngineState::Paused => 2,
        EngineState::Running => 3,
        EngineState::Error => 4,
    }
}

/// Frames rendered since the last reset.
#[no_mangle]
pub extern "C" fn engine_frame_count(engine: *const Engine) -> u64 {
    if engine.is_null() {
        return 0;
    }
    unsafe { &*engine }.frame_count()
}

/// Pointer to the scan-out framebuffer, one packed 0xRRGGBBAA word per pixel,
/// owned by the engine. Writes width and height to the provided pointers if
/// non-null. Returns null if the engine pointer is null.
#[no_mangle]
pub extern "C" fn engine_framebuffer(engine: *const Engine, w: *mut i32, h: *mut i32) -> *const u32 {
    if engine.is_null() {
        return ptr::null();
    }

    let engine = unsafe { &*engine };
    if !w.is_null() {
        unsafe { *w = SCREEN_WIDTH as i32 };
    }
    if !h.is_null() {
        unsafe { *h = SCREEN_HEIGHT as i32 };
    }
    engine.framebuffer().as_ptr()
}

/// Push one byte into the UART's receive FIFO.
#[no_mangle]
pub extern "C" fn engine_uart_enqueue_rx(engine: *mut Engine, byte: u8) {
    if engine.is_null() {
        return;
    }
    unsafe { &mut *engine }.uart_enqueue_rx(byte);
}

/// Drain bytes the UART has transmitted since the last call into `out`.
/// Returns the number of bytes written, which is clamped to `cap` — any
/// remainder is dropped, matching the UART's own fixed-depth TX path.
#[no_mangle]
pub extern "C" fn engine_uart_drain_tx(engine: *mut Engine, out: *mut u8, cap: usize) -> usize {
    if engine.is_null() || out.is_null() {
        return 0;
    }
    let engine = unsafe { &mut *engine };
    let drained = engine.uart_drain_tx();
    let n = drained.len().min(cap);
    let dest = unsafe { slice::from_raw_parts_mut(out, n) };
    dest.copy_from_slice(&drained[..n]);
    n
}

/// Whether the engine is sitting in the Error state with a fault report
/// available. Returns 0/1, or -1 for a null pointer.
#[no_mangle]
pub extern "C" fn engine_has_fault(engine: *const Engine) -> i32 {
    if engine.is_null() {
        return -1;
    }
    unsafe { &*engine }.last_fatal().is_some() as i32
}

/// Program counter of the last fatal fault. Returns 0 if there is none.
#[no_mangle]
pub extern "C" fn engine_fault_pc(engine: *const Engine) -> u32 {
    if engine.is_null() {
        return 0;
    }
    unsafe { &*engine }
        .last_fatal()
        .map(|f| f.pc)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_destroy() {
        let engine = engine_create();
        assert!(!engine.is_null());
        engine_destroy(engine);
    }

    #[test]
    fn test_framebuffer_dimensions() {
        let engine = engine_create();
        let mut w: i32 = 0;
        let mut h: i32 = 0;
        let fb = engine_framebuffer(engine, &mut w, &mut h);

        assert!(!fb.is_null());
        assert_eq!(w, 320);
        assert_eq!(h, 240);

        engine_destroy(engine);
    }

    #[test]
    fn test_state_starts_stopped() {
        let engine = engine_create();
        assert_eq!(engine_state(engine), 0);
        engine_destroy(engine);
    }

    #[test]
    fn test_null_pointers_are_inert() {
        assert_eq!(engine_load_rom(ptr::null_mut(), ptr::null(), 0), -1);
        assert_eq!(engine_state(ptr::null()), -1);
        assert_eq!(engine_has_fault(ptr::null()), -1);
        engine_reset(ptr::null_mut());
        engine_destroy(ptr::null_mut());
    }

    #[test]
    fn test_uart_round_trip_through_ffi() {
        let engine = engine_create();
        engine_uart_enqueue_rx(engine, 0x41);

        let mut out = [0u8; 4];
        // Nothing was transmitted yet, so draining returns nothing.
        assert_eq!(engine_uart_drain_tx(engine, out.as_mut_ptr(), out.len()), 0);

        engine_destroy(engine);
    }
}
