//! Crash injection for testing commit durability.
//!
//! A [`CrashInjector`] counts the I/O calls a test backend forwards to it and
//! reports when the configured [`CrashPoint`] is reached. The backend then
//! fails that call, leaving the on-disk bytes as a crash at that instant would.
//!
//! # Crash Points
//!
//! A commit runs this sequence:
//!
//! ```text
//! Append frame → Sync → Write secondary slot → Sync → Flip god byte → Sync
//!      ↑           ↑              ↑                         ↑            ↑
//! DuringFrameWrite │       DuringSlotWrite         BeforeGodByteFlip     │
//!           BeforeFirstSync                                      AfterGodByteFlip
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
};

/// Points in the commit sequence where a crash can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrashPoint {
    /// The journal frame write fails.
    ///
    /// On-disk state: possibly a partial frame past the committed end.
    /// Recovery discards it.
    DuringFrameWrite,

    /// The frame was written but the first sync fails.
    ///
    /// On-disk state: frame bytes present, header untouched.
    BeforeFirstSync,

    /// Writing the secondary commit slot fails.
    ///
    /// On-disk state: header untouched. Recovery uses the old primary slot.
    DuringSlotWrite,

    /// The secondary slot is written and synced, but the god byte flip fails.
    ///
    /// On-disk state: both slots valid, god byte still on the old slot.
    BeforeGodByteFlip,

    /// The god byte flip is written but the final sync fails.
    ///
    /// On-disk state: the new slot is active. Whether it survives a real
    /// power loss depends on the device; recovery must accept either outcome.
    AfterGodByteFlip,
}

/// Tracks crash injection state for deterministic crash simulation.
///
/// All state is atomic, so a `CrashInjector` can be shared with a backend
/// that is itself shared across threads.
#[derive(Debug)]
pub struct CrashInjector {
    crash_point: CrashPoint,
    sync_count: AtomicU32,
    header_write_count: AtomicU32,
    crashed: AtomicBool,
    armed: AtomicBool,
}

impl CrashInjector {
    /// Creates a disarmed injector targeting `crash_point`.
    pub fn new(crash_point: CrashPoint) -> Arc<Self> {
        Arc::new(Self {
            crash_point,
            sync_count: AtomicU32::new(0),
            header_write_count: AtomicU32::new(0),
            crashed: AtomicBool::new(false),
            armed: AtomicBool::new(false),
        })
    }

    /// Arms the injector and resets its counters.
    ///
    /// Injectors start disarmed so setup commits run normally.
    pub fn arm(&self) {
        self.sync_count.store(0, Ordering::SeqCst);
        self.header_write_count.store(0, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Disarms the injector.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Whether the crash has been triggered.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    fn live(&self) -> bool {
        self.armed.load(Ordering::SeqCst) && !self.crashed.load(Ordering::SeqCst)
    }

    fn trigger(&self, should_crash: bool) -> bool {
        if should_crash {
            self.crashed.store(true, Ordering::SeqCst);
        }
        should_crash
    }

    /// Records a journal (non-header) write; returns `true` if it must fail.
    pub fn on_journal_write(&self) -> bool {
        if !self.live() {
            return false;
        }
        self.trigger(self.crash_point == CrashPoint::DuringFrameWrite)
    }

    /// Records a sync; returns `true` if it must fail.
    pub fn on_sync(&self) -> bool {
        if !self.live() {
            return false;
        }
        let count = self.sync_count.fetch_add(1, Ordering::SeqCst);
        self.trigger(match self.crash_point {
            CrashPoint::BeforeFirstSync => count == 0,
            CrashPoint::AfterGodByteFlip => count == 2,
            _ => false,
        })
    }

    /// Records a header write; returns `true` if it must fail.
    pub fn on_header_write(&self) -> bool {
        if !self.live() {
            return false;
        }
        let count = self.header_write_count.fetch_add(1, Ordering::SeqCst);
        self.trigger(match self.crash_point {
            CrashPoint::DuringSlotWrite => count == 0,
            CrashPoint::BeforeGodByteFlip => count == 1,
            _ => false,
        })
    }

    /// Returns the configured crash point.
    pub fn crash_point(&self) -> CrashPoint {
        self.crash_point
    }

    /// Number of syncs observed since arming.
    pub fn sync_count(&self) -> u32 {
        self.sync_count.load(Ordering::SeqCst)
    }

    /// Number of header writes observed since arming.
    pub fn header_write_count(&self) -> u32 {
        self.header_write_count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_crash_injector_starts_disarmed() {
        let injector = CrashInjector::new(CrashPoint::BeforeFirstSync);
        assert!(!injector.on_sync());
        assert!(!injector.has_crashed());
    }

    #[test]
    fn test_before_god_byte_flip_fails_second_header_write() {
        let injector = CrashInjector::new(CrashPoint::BeforeGodByteFlip);
        injector.arm();

        assert!(!injector.on_journal_write());
        assert!(!injector.on_sync());
        assert!(!injector.on_header_write());
        assert!(!injector.on_sync());
        assert!(injector.on_header_write());
        assert!(injector.has_crashed());
    }

    #[test]
    fn test_crash_triggers_once() {
        let injector = CrashInjector::new(CrashPoint::DuringFrameWrite);
        injector.arm();
        assert!(injector.on_journal_write());
        assert!(!injector.on_journal_write());
    }

    #[test]
    fn test_arm_resets_state() {
        let injector = CrashInjector::new(CrashPoint::AfterGodByteFlip);
        injector.arm();
        for _ in 0..3 {
            injector.on_sync();
        }
        assert!(injector.has_crashed());

        injector.arm();
        assert!(!injector.has_crashed());
        assert_eq!(injector.sync_count(), 0);
    }

    #[test]
    fn test_disarm_prevents_crash() {
        let injector = CrashInjector::new(CrashPoint::DuringSlotWrite);
        injector.arm();
        injector.disarm();
        assert!(!injector.on_header_write());
        assert!(!injector.has_crashed());
    }
}
