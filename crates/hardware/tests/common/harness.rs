use rowprobe_core::ProbeConfig;
use rowprobe_core::common::{KIB, MIB};
use rowprobe_core::config::PagePolicy;
use rowprobe_core::memory::SimulatedMemory;

/// Routes `tracing` output through the test writer. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// A configuration small enough for the simulated backend:
/// 1 MiB arena, 15 scan candidates at 64 KiB strides, 5 trials.
pub fn small_config() -> ProbeConfig {
    let mut config = ProbeConfig::default();
    config.arena.size_bytes = MIB;
    config.sampler.trial_count = 5;
    config.sampler.warmup_count = 2;
    config.scan.stride = 64 * KIB;
    config.copy_sweep.size_exponents = vec![6, 8, 12];
    config.copy_sweep.trial_count = 4;
    config.copy_sweep.warmup_count = 1;
    config
}

/// A simulated backend for `config` with the given page policy.
pub fn simulated(config: &ProbeConfig, policy: PagePolicy) -> SimulatedMemory {
    let mut simulation = config.simulation.clone();
    simulation.policy = policy;
    SimulatedMemory::new(&simulation, config.arena.line_size).expect("valid simulation geometry")
}
