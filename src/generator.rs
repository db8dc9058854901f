//! Random password generation and a simple strength score.

use rand::Rng;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;

const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "!@#$%^&*()-_=+[]{}|;:,.<>?/";

/// Shortest password [`generate`] will produce.
pub const MIN_LENGTH: usize = 4;

/// Scores below this are reported as weak.
pub const WEAK_THRESHOLD: u8 = 50;

/// Which character classes to draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharClasses {
    pub lower: bool,
    pub upper: bool,
    pub digits: bool,
    pub symbols: bool,
}

impl Default for CharClasses {
    fn default() -> Self {
        Self {
            lower: true,
            upper: true,
            digits: true,
            symbols: true,
        }
    }
}

impl CharClasses {
    fn selected(&self) -> Vec<&'static str> {
        let mut sets = Vec::with_capacity(4);
        if self.lower {
            sets.push(LOWERCASE);
        }
        if self.upper {
            sets.push(UPPERCASE);
        }
        if self.digits {
            sets.push(DIGITS);
        }
        if self.symbols {
            sets.push(SYMBOLS);
        }
        sets
    }
}

/// Generates a random password using the operating system RNG.
///
/// `length` is raised to [`MIN_LENGTH`]. Every selected class contributes at
/// least one character; with nothing selected, lowercase letters and digits
/// are used.
pub fn generate(length: usize, classes: CharClasses) -> String {
    let length = length.max(MIN_LENGTH);
    let mut rng = OsRng;

    let mut sets = classes.selected();
    if sets.is_empty() {
        sets = vec![LOWERCASE, DIGITS];
    }
    let charset: Vec<char> = sets.iter().flat_map(|s| s.chars()).collect();

    let mut password: Vec<char> = sets
        .iter()
        .map(|s| pick(&mut rng, &s.chars().collect::<Vec<_>>()))
        .collect();
    while password.len() < length {
        password.push(pick(&mut rng, &charset));
    }
    password.shuffle(&mut rng);

    password.into_iter().collect()
}

fn pick<R: Rng>(rng: &mut R, chars: &[char]) -> char {
    chars[rng.gen_range(0..chars.len())]
}

/// Scores a password from 0 to 100 based on length, character variety and
/// penalties for repeated characters and ascending runs.
pub fn score_strength(password: &str) -> u8 {
    let chars: Vec<char> = password.chars().collect();
    let mut score: i32 = match chars.len() {
        n if n >= 12 => 25,
        n if n >= 8 => 15,
        n if n >= 6 => 10,
        _ => 0,
    };

    let has = |set: &str| chars.iter().any(|c| set.contains(*c));
    if has(LOWERCASE) {
        score += 15;
    }
    if has(UPPERCASE) {
        score += 15;
    }
    if has(DIGITS) {
        score += 20;
    }
    if has(SYMBOLS) {
        score += 25;
    }

    let mut seen = std::collections::HashMap::new();
    for c in &chars {
        *seen.entry(*c).or_insert(0u32) += 1;
    }
    let repeated = seen.values().filter(|&&n| n > 1).count() as i32;
    score = (score - (repeated * 5).min(15)).max(0);

    let sequential = chars
        .windows(3)
        .filter(|w| {
            let (a, b, c) = (w[0] as u32, w[1] as u32, w[2] as u32);
            a + 1 == b && b + 1 == c
        })
        .count() as i32;
    score = (score - (sequential * 5).min(10)).max(0);

    score.min(100) as u8
}

/// Whether the score of `password` is below [`WEAK_THRESHOLD`].
pub fn is_weak(password: &str) -> bool {
    score_strength(password) < WEAK_THRESHOLD
}
