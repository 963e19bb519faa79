//! Strategies for choosing between two simultaneously viable sides of a pipe

use crate::error::PipeError;
use rand::prelude::*;
use rand_pcg::Pcg32;
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        Mutex,
    },
};


/// One of the two sides of an either-inlet or either-outlet pipe
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// The other side
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Decides which side wins when both sides of a pipe could take part in a transfer
///
/// The strategy is fixed at construction. Resolution is consulted only for genuine ties, so
/// stateful strategies advance once per tie, not once per transfer.
pub struct TieBreaker {
    strategy: Strategy,
}

enum Strategy {
    Prioritising(Side),
    // the side the next resolution will pick.
    Alternating(AtomicBool),
    Randomising {
        // probability of choosing left.
        p: f64,
        rng: Mutex<Pcg32>,
    },
    Custom(Mutex<Box<dyn FnMut() -> Side + Send>>),
}

/// Description of a tie-breaker's strategy, for inspection
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TieBreakerKind {
    /// Always the given side
    Prioritising(Side),
    /// Opposite of the previous resolution
    Alternating,
    /// Left with the given probability
    Randomising(f64),
    /// A caller-supplied function
    Custom,
}

impl TieBreaker {
    /// Always resolve to `side`.
    pub fn prioritising(side: Side) -> Self {
        TieBreaker { strategy: Strategy::Prioritising(side) }
    }

    /// Resolve to `first`, then flip on every subsequent resolution.
    pub fn alternating(first: Side) -> Self {
        TieBreaker { strategy: Strategy::Alternating(AtomicBool::new(first == Side::Left)) }
    }

    /// Resolve to left with probability `p`, seeded from the thread rng.
    pub fn randomising(p: f64) -> Result<Self, PipeError> {
        Self::randomising_seeded(p, rand::random())
    }

    /// Resolve to left with probability `p`, from a reproducible seed.
    pub fn randomising_seeded(p: f64, seed: u64) -> Result<Self, PipeError> {
        if !(0.0..=1.0).contains(&p) {
            return Err(PipeError::ArgumentInvalid("probability must be within 0 and 1"));
        }
        Ok(TieBreaker {
            strategy: Strategy::Randomising {
                p,
                rng: Mutex::new(Pcg32::seed_from_u64(seed)),
            },
        })
    }

    /// Resolve by calling `f`.
    pub fn custom<F>(f: F) -> Self
    where
        F: FnMut() -> Side + Send + 'static,
    {
        TieBreaker { strategy: Strategy::Custom(Mutex::new(Box::new(f))) }
    }

    /// Which strategy this tie-breaker uses
    pub fn kind(&self) -> TieBreakerKind {
        match &self.strategy {
            &Strategy::Prioritising(side) => TieBreakerKind::Prioritising(side),
            &Strategy::Alternating(_) => TieBreakerKind::Alternating,
            &Strategy::Randomising { p, .. } => TieBreakerKind::Randomising(p),
            &Strategy::Custom(_) => TieBreakerKind::Custom,
        }
    }

    /// Choose a side for a tie.
    pub fn resolve_tie(&self) -> Side {
        let side = match &self.strategy {
            &Strategy::Prioritising(side) => side,
            &Strategy::Alternating(ref next_left) => {
                // fetch_xor flips and returns the previous value in one step
                if next_left.fetch_xor(true, SeqCst) { Side::Left } else { Side::Right }
            }
            &Strategy::Randomising { p, ref rng } => {
                if rng.lock().unwrap().gen_bool(p) { Side::Left } else { Side::Right }
            }
            &Strategy::Custom(ref f) => {
                let mut f = f.lock().unwrap();
                (*f)()
            }
        };
        trace!(?side, "resolved tie");
        side
    }
}

impl Default for TieBreaker {
    fn default() -> Self {
        TieBreaker::prioritising(Side::Left)
    }
}

impl fmt::Debug for TieBreaker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("TieBreaker").field(&self.kind()).finish()
    }
}
