//! One-time passcodes for the share acceptance second factor.

use rand::Rng;

pub const CODE_MIN: u32 = 100_000;
pub const CODE_MAX: u32 = 999_999;

/// Draw a uniformly random 6-digit passcode.
pub fn generate_code() -> u32 {
    rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_always_have_six_digits() {
        for _ in 0..1_000 {
            let code = generate_code();
            assert!((CODE_MIN..=CODE_MAX).contains(&code), "{}", code);
        }
    }

    #[test]
    fn codes_are_not_constant() {
        let first = generate_code();
        let all_identical =
            (0..100).map(|_| generate_code()).all(|code| code == first);

        assert!(!all_identical);
    }
}
