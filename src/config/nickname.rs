//! Anonymous login names.
//!
//! The chat service accepts any `justinfan` nickname followed by digits
//! without a password. Such a login can read channels but not speak.

use rand::RngExt;

const ANONYMOUS_PREFIX: &str = "justinfan";

/// Generate a name like `justinfan48213`.
pub fn anonymous_nickname() -> String {
    let mut rng = rand::rng();
    let num: u32 = rng.random_range(10_000..100_000);
    format!("{}{}", ANONYMOUS_PREFIX, num)
}
