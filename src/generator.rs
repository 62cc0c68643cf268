//! Placeholder meme generator.
//!
//! Picks uniformly from a fixed set of lines, plus one line built from the
//! caller's query when it is non-empty. The random source is injected so a
//! fixed seed reproduces the same sequence.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BASE_MEMES: [&str; 3] = [
    "One does not simply walk into Mordor.",
    "Why can't programmers tell jokes? Because we don't get them.",
    "I would explain this to you, but it's in binary.",
];

pub struct MemeGenerator {
    rng: Mutex<StdRng>,
}

impl MemeGenerator {
    /// Generator with a deterministic sequence.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Generator seeded once from the thread-local entropy source.
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_rng(&mut rand::rng())),
        }
    }

    /// Build from an optional configured seed.
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::from_seed(seed),
            None => Self::from_entropy(),
        }
    }

    /// Every line `generate` may return for `query`.
    pub fn candidates(query: &str) -> Vec<String> {
        let mut memes: Vec<String> = BASE_MEMES.iter().map(|m| (*m).to_string()).collect();
        if !query.is_empty() {
            memes.push(format!(
                "When you search for '{query}' and find the perfect meme."
            ));
        }
        memes
    }

    pub fn generate(&self, query: &str) -> String {
        let mut candidates = Self::candidates(query);
        let idx = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            rng.random_range(0..candidates.len())
        };
        candidates.swap_remove(idx)
    }
}
