//! Simulated Backend Unit Tests.
//!
//! Verifies that the simulated cache reacts to invalidation, that the
//! virtual clock charges timer overhead and access latencies, and that the
//! row-buffer model shows through to timed chains.

use rowprobe_core::common::{KIB, MIB};
use rowprobe_core::config::{PagePolicy, SimulationConfig};
use rowprobe_core::memory::{Arena, FixedLatency, MemoryController, SimulatedMemory};
use rowprobe_core::probe::MemoryPort;
use rowprobe_core::timing::{CacheInvalidator, CycleClock};

fn fixed() -> SimulatedMemory<FixedLatency> {
    SimulatedMemory::with_controller(FixedLatency::new(100), 64, 4, 24)
}

fn timed_load<C: MemoryController>(sim: &mut SimulatedMemory<C>, byte: &u8) -> u64 {
    let begin = sim.begin();
    sim.load(byte);
    sim.end() - begin
}

#[test]
fn cold_load_costs_dram_warm_load_costs_cache() {
    let arena = Arena::allocate(64 * KIB, 64 * KIB, 0).unwrap();
    let byte = arena.byte(4096).unwrap();
    let mut sim = fixed();

    assert_eq!(timed_load(&mut sim, byte), 24 + 100);
    assert!(sim.is_cached(std::ptr::from_ref(byte) as usize));
    assert_eq!(timed_load(&mut sim, byte), 24 + 4);

    sim.invalidate(std::slice::from_ref(byte));
    assert!(!sim.is_cached(std::ptr::from_ref(byte) as usize));
    assert_eq!(timed_load(&mut sim, byte), 24 + 100);
    assert_eq!(sim.dram_accesses(), 2);
}

#[test]
fn invalidation_covers_whole_lines() {
    let arena = Arena::allocate(64 * KIB, 64 * KIB, 0).unwrap();
    let mut sim = fixed();
    sim.load(arena.byte(0).unwrap());
    sim.load(arena.byte(64).unwrap());
    sim.load(arena.byte(128).unwrap());

    // One byte at the end of line 0 through one byte at the start of line 1.
    sim.invalidate(arena.region(63, 2).unwrap());
    let base = arena.as_ptr() as usize;
    assert!(!sim.is_cached(base));
    assert!(!sim.is_cached(base + 64));
    assert!(sim.is_cached(base + 128));
}

#[test]
fn copy_charges_every_line_of_both_blocks() {
    let mut arena = Arena::allocate(64 * KIB, 64 * KIB, 1).unwrap();
    let (src, dst) = arena.as_mut_slice().split_at_mut(32 * KIB);
    let mut sim = fixed();

    let begin = sim.begin();
    sim.copy(&mut dst[..256], &src[..256]);
    assert_eq!(sim.end() - begin, 24 + 8 * 100);
    assert!(dst[..256].iter().all(|&b| b == 1));
}

#[test]
fn clock_never_runs_backwards() {
    let mut sim = fixed();
    let mut last = 0;
    for _ in 0..10 {
        let b = sim.begin();
        let e = sim.end();
        assert!(b >= last && e >= b);
        last = e;
    }
    assert_eq!(sim.now(), 10 * 24);
}

#[test]
fn open_policy_shows_row_conflicts_in_chains() {
    let arena = Arena::allocate(MIB, 64 * KIB, 0).unwrap();
    let mut sim = SimulatedMemory::new(&SimulationConfig::default(), 64).unwrap();
    assert_eq!(sim.controller().policy(), PagePolicy::Open);

    let a = arena.byte(0).unwrap();
    let same_bank = arena.byte(8 * 64 * KIB).unwrap();

    let chain = |sim: &mut SimulatedMemory, b: &u8| {
        sim.invalidate(std::slice::from_ref(a));
        sim.invalidate(std::slice::from_ref(b));
        let begin = sim.begin();
        sim.load(a);
        sim.load(b);
        sim.load(a);
        sim.end() - begin
    };

    chain(&mut sim, same_bank);
    // Steady state: A finds B's row open, B finds A's row open.
    assert_eq!(chain(&mut sim, same_bank), 24 + 42 + 42 + 4);
}
