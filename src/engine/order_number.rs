use chrono::Utc;
use rand::Rng;

const SUFFIX_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SUFFIX_LEN: usize = 5;

/// `ORD` + epoch milliseconds + 5 random uppercase alphanumerics.
///
/// Uniqueness is enforced by the ledger; a collision is retried with a fresh number.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect();
    format!("ORD{}{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn has_expected_shape() {
        let number = generate();
        assert!(number.starts_with("ORD"));
        let suffix = &number[number.len() - SUFFIX_LEN..];
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
        assert!(number[3..number.len() - SUFFIX_LEN].parse::<i64>().is_ok());
    }

    #[test]
    fn numbers_generated_together_differ() {
        let numbers: HashSet<String> = (0..200).map(|_| generate()).collect();
        assert!(numbers.len() > 190);
    }
}
