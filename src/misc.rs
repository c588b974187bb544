/// This file contains miscellaneous helper macros and the pRNG every mutation
/// stage threads through its random choices

use chrono::Local;

#[macro_export]
macro_rules! prompt {
    () => ({
        print!("\x1b[1;35m\u{2726}strata\u{2726}\x1b[0m\n");
    });
    ($($arg:tt)*) => ({
        print!("\x1b[1;35m\u{2726}strata\u{2726}\x1b[0m ");
        println!($($arg)*);
    });
}

#[macro_export]
macro_rules! prompt_warn {
    () => ({
        print!("\x1b[1;33m\u{2726}strata\u{2726}\x1b[0m\n");
    });
    ($($arg:tt)*) => ({
        print!("\x1b[1;33m\u{2726}strata\u{2726}\x1b[0m ");
        println!($($arg)*);
    });
}

#[macro_export]
macro_rules! fatal {
    ($err:expr) => {
        {
            print!("\n\x1b[1;31mfatal:\x1b[0m ");
            $err.display();
            std::process::exit(-1);
        }
    };
}

// Fallback state, xorshift never leaves zero
const ZERO_SEED_REPLACEMENT: usize = 0x2545_F491_4F6C_DD1D;

/// Generate a pRNG seed from the wall clock when the user didn't give us one
pub fn generate_seed() -> usize {
    let now = Local::now();
    let nanos = now.timestamp_subsec_nanos() as usize;
    let secs = now.timestamp() as usize;

    // Mix the two so back to back calls in the same second still differ
    secs.rotate_left(32) ^ nanos ^ ZERO_SEED_REPLACEMENT
}

/// Xorshift pRNG handle, passed explicitly so runs are reproducible from a seed
#[derive(Clone, Debug)]
pub struct Rng {
    state: usize,
}

impl Rng {
    pub fn new(seed: Option<usize>) -> Self {
        // If pRNG seed not provided, make our own
        let seed = seed.unwrap_or_else(generate_seed);

        Rng {
            state: if seed == 0 { ZERO_SEED_REPLACEMENT } else { seed },
        }
    }

    /// Current state, usable as a seed to replay from this point
    pub fn state(&self) -> usize {
        self.state
    }

    #[inline]
    pub fn rand(&mut self) -> usize {
        // Save off current value
        let curr = self.state;

        // Mutate current state with xorshift for next call
        self.state ^= self.state << 13;
        self.state ^= self.state >> 17;
        self.state ^= self.state << 43;

        // Return saved off value
        curr
    }

    /// Random value in `0..limit`, zero when the limit is zero
    #[inline]
    pub fn below(&mut self, limit: usize) -> usize {
        if limit == 0 {
            return 0;
        }

        self.rand() % limit
    }

    /// Fair coin
    #[inline]
    pub fn coin(&mut self) -> bool {
        self.below(2) == 1
    }

    #[inline]
    pub fn byte(&mut self) -> u8 {
        (self.rand() % 256) as u8
    }

    /// Reservoir pick of one element, None for an empty slice
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        let mut reserve = None;
        for (count, item) in items.iter().enumerate() {
            if self.below(count + 1) == count {
                reserve = Some(item);
            }
        }

        reserve
    }
}
