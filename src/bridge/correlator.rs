//! Request correlation.
//!
//! Each outgoing request is stamped with a fresh identifier; the response
//! must echo it. A mismatch means a stale or duplicate line was read and the
//! channel framing can no longer be trusted.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use crate::bridge::error::{BridgeError, BridgeResult};
use crate::bridge::protocol::Response;

/// Source of request identifiers.
pub trait IdGenerator: Send {
    fn next_id(&mut self) -> u32;
}

/// Random identifiers from a generator seeded once.
#[derive(Debug)]
pub struct RandomIds(StdRng);

impl RandomIds {
    /// Seed from operating system entropy.
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    pub fn from_seed(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl IdGenerator for RandomIds {
    fn next_id(&mut self) -> u32 {
        self.0.gen()
    }
}

/// Monotonic identifiers, wrapping at `u32::MAX`.
#[derive(Debug, Clone)]
pub struct SequentialIds(u32);

impl SequentialIds {
    pub fn starting_at(first: u32) -> Self {
        Self(first)
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self) -> u32 {
        let id = self.0;
        self.0 = self.0.wrapping_add(1);
        id
    }
}

/// Stamps requests and checks responses.
pub struct RequestCorrelator {
    ids: Mutex<Box<dyn IdGenerator>>,
}

impl RequestCorrelator {
    pub fn new(ids: impl IdGenerator + 'static) -> Self {
        Self {
            ids: Mutex::new(Box::new(ids)),
        }
    }

    pub fn generate_id(&self) -> u32 {
        let mut ids = self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        ids.next_id()
    }

    /// Hand back `response` only if it answers `request_id`.
    pub fn verify(&self, request_id: u32, response: Response) -> BridgeResult<Response> {
        if response.request_id != request_id {
            return Err(BridgeError::CorrelationMismatch {
                expected: request_id,
                actual: response.request_id,
            });
        }
        Ok(response)
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new(RandomIds::from_entropy())
    }
}

impl std::fmt::Debug for RequestCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCorrelator").finish_non_exhaustive()
    }
}
