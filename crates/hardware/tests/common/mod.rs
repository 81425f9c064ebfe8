/// Logging setup and configuration builders.
pub mod harness;

/// Mock and synthetic instruments.
pub mod mocks;
