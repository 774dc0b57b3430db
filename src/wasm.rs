//! WebAssembly bindings for the SPG290 / S+core interpreter core.
//!
//! This module provides JavaScript-friendly APIs using wasm-bindgen.

// Use wee_alloc as the global allocator for smaller code size and better WASM support
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

use crate::emu::{Engine, EngineState};
use wasm_bindgen::prelude::*;

fn state_code(state: EngineState) -> u32 {
    match state {
        EngineState::Stopped => 0,
        EngineState::Loading => 1,
        EngineState::Paused => 2,
        EngineState::Running => 3,
        EngineState::Error => 4,
    }
}

/// WASM-friendly wrapper around the engine.
/// Unlike the C FFI, this owns the engine directly without a raw pointer
/// since WASM is single-threaded.
#[wasm_bindgen]
pub struct WasmEngine {
    inner: Engine,
}

#[wasm_bindgen]
impl WasmEngine {
    /// Create a new engine instance.
    #[wasm_bindgen(constructor)]
    pub fn new() -> WasmEngine {
        // Set up console panic hook for better error messages
        console_error_panic_hook::set_once();

        WasmEngine { inner: Engine::new() }
    }

    /// Load a ROM image. Returns 0 on success, -1 if it failed validation.
    #[wasm_bindgen(js_name = loadRom)]
    pub fn load_rom(&mut self, data: &[u8]) -> i32 {
        match self.inner.load_rom(data) {
            Ok(()) => 0,
            Err(err) => {
                log::warn!("WasmEngine::load_rom: {err}");
                -1
            }
        }
    }

    /// Reset to the last loaded ROM's entry point.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.inner.reset();
    }

    /// Transition a loaded, non-faulted engine to Running.
    #[wasm_bindgen]
    pub fn start(&mut self) {
        self.inner.start();
    }

    /// Transition a Running engine back to Paused.
    #[wasm_bindgen]
    pub fn pause(&mut self) {
        self.inner.pause();
    }

    /// Execute exactly one instruction. Only has an effect while Paused.
    #[wasm_bindgen]
    pub fn step(&mut self) {
        self.inner.step_one();
    }

    /// Run up to one frame's worth of cycles. Intended to be called once per
    /// host vsync via `requestAnimationFrame`.
    #[wasm_bindgen(js_name = runFrame)]
    pub fn run_frame(&mut self) {
        self.inner.run_frame();
    }

    /// Coarse machine state: 0 Stopped, 1 Loading, 2 Paused, 3 Running, 4 Error.
    #[wasm_bindgen]
    pub fn state(&self) -> u32 {
        state_code(self.inner.state())
    }

    /// Frames rendered since the last reset.
    #[wasm_bindgen(js_name = frameCount)]
    pub fn frame_count(&self) -> u64 {
        self.inner.frame_count()
    }

    /// Get framebuffer width.
    #[wasm_bindgen(js_name = framebufferWidth)]
    pub fn framebuffer_width(&self) -> u32 {
        crate::emu::SCREEN_WIDTH as u32
    }

    /// Get framebuffer height.
    #[wasm_bindgen(js_name = framebufferHeight)]
    pub fn framebuffer_height(&self) -> u32 {
        crate::emu::SCREEN_HEIGHT as u32
    }

    /// Copy the framebuffer to a byte array for canvas rendering.
    /// Returns RGBA8888 bytes suitable for `ImageData`. The engine's own
    /// packed word is 0xRRGGBBAA (see `Vdu::convert_pixel`), which is
    /// already RGBA byte order once unpacked big-endian.
    #[wasm_bindgen(js_name = getFramebufferRgba)]
    pub fn get_framebuffer_rgba(&self) -> Vec<u8> {
        let pixels = self.inner.framebuffer();
        let mut rgba = Vec::with_capacity(pixels.len() * 4);
        for &packed in pixels {
            let r = ((packed >> 24) & 0xFF) as u8;
            let g = ((packed >> 16) & 0xFF) as u8;
            let b = ((packed >> 8) & 0xFF) as u8;
            let a = (packed & 0xFF) as u8;
            rgba.push(r);
            rgba.push(g);
            rgba.push(b);
            rgba.push(a);
        }
        rgba
    }

    /// Push one byte into the UART's receive FIFO.
    #[wasm_bindgen(js_name = uartEnqueueRx)]
    pub fn uart_enqueue_rx(&mut self, byte: u8) {
        self.inner.uart_enqueue_rx(byte);
    }

    /// Drain bytes the UART has transmitted since the last call.
    #[wasm_bindgen(js_name = uartDrainTx)]
    pub fn uart_drain_tx(&mut self) -> Vec<u8> {
        self.inner.uart_drain_tx()
    }

    /// Whether the engine is sitting in the Error state with a fault report
    /// available.
    #[wasm_bindgen(js_name = hasFault)]
    pub fn has_fault(&self) -> bool {
        self.inner.last_fatal().is_some()
    }

    /// Program counter of the last fatal fault, or 0 if there is none.
    #[wasm_bindgen(js_name = faultPc)]
    pub fn fault_pc(&self) -> u32 {
        self.inner.last_fatal().map(|f| f.pc).unwrap_or(0)
    }

    /// Human-readable message for the last fatal fault, or an empty string.
    #[wasm_bindgen(js_name = faultMessage)]
    pub fn fault_message(&self) -> String {
        self.inner
            .last_fatal()
            .map(|f| f.message.clone())
            .unwrap_or_default()
    }
}

impl Default for WasmEngine {
    fn default() -> Self {
        Self::new()
    }
}
