use mockall::mock;
use rowprobe_core::probe::MemoryPort;
use rowprobe_core::timing::{CacheInvalidator, CycleClock};

mock! {
    pub Rig {}
    impl CycleClock for Rig {
        fn begin(&mut self) -> u64;
        fn end(&mut self) -> u64;
    }
    impl CacheInvalidator for Rig {
        fn invalidate(&mut self, region: &[u8]);
    }
    impl MemoryPort for Rig {
        fn load(&mut self, byte: &u8) -> u8;
        fn copy(&mut self, dst: &mut [u8], src: &[u8]);
    }
}

/// A rig whose loads are free and whose every trial costs exactly the
/// `begin`-to-`end` deltas given, repeated cyclically.
pub fn scripted_rig(deltas: Vec<i64>) -> MockRig {
    let mut rig = MockRig::new();
    rig.expect_invalidate().return_const(());
    rig.expect_load().returning(|byte| *byte);
    rig.expect_copy().returning(|dst, src| dst.copy_from_slice(src));
    rig.expect_begin().return_const(1_000_000u64);
    let mut next = 0usize;
    rig.expect_end().returning(move || {
        let delta = deltas[next % deltas.len()];
        next += 1;
        1_000_000u64.checked_add_signed(delta).unwrap()
    });
    rig
}

/// Synthetic instruments charging a fixed, pair-dependent latency.
///
/// Every trial costs `latency(offset)` cycles, where `offset` is the
/// arena offset of the last load that was not the base address. No
/// caching, no noise.
pub struct SyntheticRig<F: Fn(usize) -> u64> {
    arena_start: usize,
    base_offset: usize,
    latency: F,
    now: u64,
    pending: u64,
    pub invalidations: usize,
}

impl<F: Fn(usize) -> u64> SyntheticRig<F> {
    pub fn new(arena_start: *const u8, base_offset: usize, latency: F) -> Self {
        Self {
            arena_start: arena_start as usize,
            base_offset,
            latency,
            now: 0,
            pending: 0,
            invalidations: 0,
        }
    }
}

impl<F: Fn(usize) -> u64> CycleClock for SyntheticRig<F> {
    fn begin(&mut self) -> u64 {
        self.now
    }

    fn end(&mut self) -> u64 {
        self.now += self.pending;
        self.now
    }
}

impl<F: Fn(usize) -> u64> CacheInvalidator for SyntheticRig<F> {
    fn invalidate(&mut self, _region: &[u8]) {
        self.invalidations += 1;
    }
}

impl<F: Fn(usize) -> u64> MemoryPort for SyntheticRig<F> {
    fn load(&mut self, byte: &u8) -> u8 {
        let offset = std::ptr::from_ref(byte) as usize - self.arena_start;
        if offset != self.base_offset {
            self.pending = (self.latency)(offset);
        }
        *byte
    }

    fn copy(&mut self, dst: &mut [u8], src: &[u8]) {
        dst.copy_from_slice(src);
        self.pending = src.len() as u64;
    }
}
