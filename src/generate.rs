//! Input vector generation for the CLI, benches and tests.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::element::Element;

/// How to fill an input vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Every element is 1.
    Ones,
    /// Repeating `-3, -2, …, 3` pattern.
    Ramp,
    /// Uniform random values from a seeded generator.
    Random { seed: u64 },
}

impl Fill {
    /// Build a vector of `len` elements.
    ///
    /// Random fills with the same seed produce the same vector. The second
    /// input of a pair should use a different seed.
    pub fn generate<T: Element>(self, len: usize) -> Vec<T> {
        match self {
            Fill::Ones => vec![T::from_i32(1); len],
            Fill::Ramp => (0..len).map(|i| T::from_i32((i % 7) as i32 - 3)).collect(),
            Fill::Random { seed } => {
                let mut rng = StdRng::seed_from_u64(seed);
                (0..len).map(|_| T::random(&mut rng)).collect()
            }
        }
    }

    /// Generate the `A`, `B` input pair.
    pub fn pair<T: Element>(self, len: usize) -> (Vec<T>, Vec<T>) {
        let second = match self {
            Fill::Random { seed } => Fill::Random {
                seed: seed.wrapping_add(1),
            },
            other => other,
        };
        (self.generate(len), second.generate(len))
    }
}

impl fmt::Display for Fill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fill::Ones => f.write_str("ones"),
            Fill::Ramp => f.write_str("ramp"),
            Fill::Random { seed } => write!(f, "random(seed={seed})"),
        }
    }
}

impl FromStr for Fill {
    type Err = String;

    /// Parses `ones`, `ramp` or `random`; random fills default to seed 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ones" => Ok(Fill::Ones),
            "ramp" => Ok(Fill::Ramp),
            "random" => Ok(Fill::Random { seed: 0 }),
            other => Err(format!("unknown fill '{other}' (expected ones, ramp, random)")),
        }
    }
}
