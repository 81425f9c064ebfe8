//! Access patterns and their executor.
//!
//! A pattern names the data movement of one trial; an [`Access`] binds it to
//! concrete bytes of an arena. [`execute`] performs exactly that movement
//! through a [`MemoryPort`] and returns an observed byte the caller must
//! consume after the timed region.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::ProbeError;

use super::instruments::MemoryPort;

/// Kind of memory operation timed by a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pattern {
    /// One load of the target byte.
    SingleLoad,
    /// Loads of A, then B, then A again.
    DependentChain,
    /// Copy of a whole source block into a destination block.
    BlockCopy,
}

impl Pattern {
    /// Stable label used in logs and output.
    pub const fn label(self) -> &'static str {
        match self {
            Self::SingleLoad => "single-load",
            Self::DependentChain => "dependent-chain",
            Self::BlockCopy => "block-copy",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A pattern bound to the bytes it touches.
#[derive(Debug)]
pub enum Access<'a> {
    /// [`Pattern::SingleLoad`] of `target`.
    Load {
        /// Byte read.
        target: &'a u8,
    },
    /// [`Pattern::DependentChain`]: `base`, `candidate`, `base`.
    Chain {
        /// Address A.
        base: &'a u8,
        /// Address B.
        candidate: &'a u8,
    },
    /// [`Pattern::BlockCopy`] of `src` into `dst`.
    Copy {
        /// Source block.
        src: &'a [u8],
        /// Destination block, same length as `src`.
        dst: &'a mut [u8],
    },
}

impl<'a> Access<'a> {
    /// A single load of `target`.
    pub const fn load(target: &'a u8) -> Self {
        Self::Load { target }
    }

    /// The A->B->A chain.
    pub const fn chain(base: &'a u8, candidate: &'a u8) -> Self {
        Self::Chain { base, candidate }
    }

    /// A block copy; `src` and `dst` must have the same length.
    pub fn block_copy(src: &'a [u8], dst: &'a mut [u8]) -> Result<Self, ProbeError> {
        if src.len() != dst.len() {
            return Err(ProbeError::OutOfBounds {
                offset: 0,
                len: src.len(),
                size: dst.len(),
            });
        }
        Ok(Self::Copy { src, dst })
    }

    /// The pattern this access performs.
    pub const fn pattern(&self) -> Pattern {
        match self {
            Self::Load { .. } => Pattern::SingleLoad,
            Self::Chain { .. } => Pattern::DependentChain,
            Self::Copy { .. } => Pattern::BlockCopy,
        }
    }

    /// Calls `f` with every region the access touches, so all of them can be
    /// made cold before a trial.
    pub fn for_each_region(&self, mut f: impl FnMut(&[u8])) {
        match self {
            Self::Load { target } => f(std::slice::from_ref(*target)),
            Self::Chain { base, candidate } => {
                f(std::slice::from_ref(*base));
                f(std::slice::from_ref(*candidate));
            }
            Self::Copy { src, dst } => {
                f(*src);
                f(&**dst);
            }
        }
    }

    /// Bytes moved by one execution.
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Load { .. } => 1,
            Self::Chain { .. } => 3,
            Self::Copy { src, .. } => src.len(),
        }
    }
}

/// Performs `access` through `port` and returns the observed byte.
///
/// Chain loads are issued in program order through the port, whose loads are
/// volatile, so neither can be hoisted past the other. The returned byte
/// folds every loaded value (or the first destination byte of a copy) and
/// must be passed to [`std::hint::black_box`] after the clock is read.
#[inline(always)]
pub fn execute<P: MemoryPort + ?Sized>(port: &mut P, access: &mut Access<'_>) -> u8 {
    match access {
        Access::Load { target } => port.load(*target),
        Access::Chain { base, candidate } => {
            let a = port.load(*base);
            let b = port.load(*candidate);
            let c = port.load(*base);
            a ^ b ^ c
        }
        Access::Copy { src, dst } => {
            port.copy(&mut **dst, *src);
            dst.first().copied().unwrap_or_default()
        }
    }
}
