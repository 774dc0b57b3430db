//! Typed breakpoint/watchpoint/snapshot surface for a host debugger UI.
//!
//! Per the redesign note on string-keyed debugger commands, this module
//! knows nothing about any command grammar — it is a small library of data
//! the engine happens to expose. It never mutates CPU/MIU state itself
//! except through the explicit watchpoint-checking helper, which is only
//! consulted when a debugger is actually attached.

use std::collections::{HashSet, VecDeque};

use crate::cpu::flags::Flags;
use crate::cpu::Cpu;

/// Kind of memory access a watchpoint should fire on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

/// One address + access-kind pair to watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watchpoint {
    pub addr: u32,
    pub kind: AccessKind,
}

/// Read-only view of the machine state for a host UI, refreshed at a
/// throttled interval by the engine rather than every instruction.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub pc: u32,
    pub gpr: [u32; 32],
    pub flags: Flags,
    pub cycles: u64,
    pub instructions: u64,
    pub pc_history: Vec<u32>,
}

/// How many recently-executed PCs the ring buffer retains.
const PC_HISTORY_CAPACITY: usize = 64;

/// Breakpoints, watchpoints, and the execution-history ring buffer. Owned by
/// the engine and only consulted when `attached` is true, so a normal run
/// with no debugger pays no overhead beyond one boolean check per step.
pub struct Debugger {
    attached: bool,
    breakpoints: HashSet<u32>,
    watchpoints: Vec<Watchpoint>,
    pc_history: VecDeque<u32>,
}

impl Debugger {
    pub fn new() -> Self {
        Self {
            attached: false,
            breakpoints: HashSet::new(),
            watchpoints: Vec::new(),
            pc_history: VecDeque::with_capacity(PC_HISTORY_CAPACITY),
        }
    }

    pub fn attach(&mut self) {
        self.attached = true;
    }

    pub fn detach(&mut self) {
        self.attached = false;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn add_breakpoint(&mut self, pc: u32) {
        self.breakpoints.insert(pc);
    }

    pub fn remove_breakpoint(&mut self, pc: u32) {
        self.breakpoints.remove(&pc);
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = &u32> {
        self.breakpoints.iter()
    }

    /// Consulted by the engine's slice loop before each `cpu.step()`.
    pub fn should_break(&self, pc: u32) -> bool {
        self.breakpoints.contains(&pc)
    }

    pub fn add_watchpoint(&mut self, wp: Watchpoint) {
        self.watchpoints.push(wp);
    }

    pub fn clear_watchpoints(&mut self) {
        self.watchpoints.clear();
    }

    /// Whether `addr` is watched for `kind`; the MIU's debug-hook path calls
    /// this only when a debugger is attached, never on the ordinary hot path.
    pub fn watches(&self, addr: u32, kind: AccessKind) -> bool {
        self.watchpoints.iter().any(|w| w.addr == addr && w.kind == kind)
    }

    /// Record one executed PC into the ring buffer; called by the engine
    /// once per instruction only while a debugger is attached.
    pub fn record_pc(&mut self, pc: u32) {
        if self.pc_history.len() == PC_HISTORY_CAPACITY {
            self.pc_history.pop_front();
        }
        self.pc_history.push_back(pc);
    }

    /// Build a read-only snapshot of the machine for a host UI.
    pub fn snapshot(&self, cpu: &Cpu) -> Snapshot {
        let mut gpr = [0u32; 32];
        for (i, slot) in gpr.iter_mut().enumerate() {
            *slot = cpu.gpr(i as u8);
        }
        Snapshot {
            pc: cpu.pc(),
            gpr,
            flags: cpu.flags(),
            cycles: cpu.cycles,
            instructions: cpu.instructions,
            pc_history: self.pc_history.iter().copied().collect(),
        }
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoint_set_round_trips() {
        let mut dbg = Debugger::new();
        dbg.add_breakpoint(0x9E00_0100);
        assert!(dbg.should_break(0x9E00_0100));
        assert!(!dbg.should_break(0x9E00_0104));
        dbg.remove_breakpoint(0x9E00_0100);
        assert!(!dbg.should_break(0x9E00_0100));
    }

    #[test]
    fn watchpoint_matches_address_and_kind() {
        let mut dbg = Debugger::new();
        dbg.add_watchpoint(Watchpoint { addr: 0xA000_0000, kind: AccessKind::Write });
        assert!(dbg.watches(0xA000_0000, AccessKind::Write));
        assert!(!dbg.watches(0xA000_0000, AccessKind::Read));
        assert!(!dbg.watches(0xA000_0004, AccessKind::Write));
    }

    #[test]
    fn pc_history_ring_buffer_drops_oldest() {
        let mut dbg = Debugger::new();
        for pc in 0..(PC_HISTORY_CAPACITY as u32 + 10) {
            dbg.record_pc(pc);
        }
        let cpu = Cpu::new();
        let snap = dbg.snapshot(&cpu);
        assert_eq!(snap.pc_history.len(), PC_HISTORY_CAPACITY);
        assert_eq!(snap.pc_history[0], 10);
    }

    #[test]
    fn snapshot_reads_gpr_file_and_flags() {
        let mut cpu = Cpu::new();
        cpu.set_gpr(5, 0x1234);
        cpu.set_pc(0x9E00_0008);
        let dbg = Debugger::new();
        let snap = dbg.snapshot(&cpu);
        assert_eq!(snap.gpr[5], 0x1234);
        assert_eq!(snap.pc, 0x9E00_0008);
        assert_eq!(snap.gpr[0], 0);
    }
}
