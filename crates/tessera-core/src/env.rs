//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (randomness, wall clock).
//! Every ephemeral key, IV and salt is drawn through [`Environment`], so a
//! seeded environment replays a whole conversation byte for byte.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Abstract environment providing randomness and time.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Seconds since the Unix epoch, used to timestamp stored history.
    fn wall_clock_secs(&self) -> u64;

    /// Generates a random fixed-size array.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }
}

/// Production environment using the OS RNG and the system clock.
///
/// # Panics
///
/// Panics if the OS RNG fails. A client without functioning cryptographic
/// randomness cannot generate keys or IVs safely.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - keys cannot be generated");
    }

    #[allow(clippy::disallowed_methods)]
    #[allow(clippy::expect_used)]
    fn wall_clock_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)")
            .as_secs()
    }
}

/// Deterministic environment for tests and simulation.
///
/// ChaCha20 seeded RNG and a virtual clock that advances one second per
/// reading. Clones share state, so two parties built from clones of one
/// `SeededEnv` draw from a single stream. Not for production use.
#[derive(Clone, Debug)]
pub struct SeededEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
    clock: Arc<AtomicU64>,
}

/// Virtual clock start (2024-01-01T00:00:00Z)
const SEEDED_CLOCK_START: u64 = 1_704_067_200;

impl SeededEnv {
    /// Create an environment from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
            clock: Arc::new(AtomicU64::new(SEEDED_CLOCK_START)),
        }
    }
}

impl Environment for SeededEnv {
    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng
            .lock()
            .expect("invariant: seeded RNG lock is never poisoned")
            .fill_bytes(buffer);
    }

    fn wall_clock_secs(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }
}
