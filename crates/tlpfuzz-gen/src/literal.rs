//! Random SQL literals.

use rand::{Rng, RngCore};

use crate::schema::DataType;

const TEXT_POOL: &[&str] = &["", "a", "b", "abc", "A", " ", "0", "1.5", "%", "x'y", "-1"];
const LIKE_PATTERNS: &[&str] = &["%", "a%", "%b%", "_", "a_c", "%'%", ""];

/// Quotes `text` as a SQL string literal.
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

pub fn int_literal(rng: &mut dyn RngCore) -> String {
    match rng.gen_range(0..20) {
        0 => i64::from(i32::MAX).to_string(),
        1 => i64::from(i32::MIN).to_string(),
        2 => "0".to_string(),
        _ => rng.gen_range(-100i64..=100).to_string(),
    }
}

pub fn float_literal(rng: &mut dyn RngCore) -> String {
    match rng.gen_range(0..20) {
        0 => "0.0".to_string(),
        1 => "-0.0".to_string(),
        2 => "1e300".to_string(),
        _ => {
            let v: f64 = rng.gen_range(-100.0..100.0);
            format!("{v:.3}")
        }
    }
}

pub fn text_literal(rng: &mut dyn RngCore) -> String {
    quote(TEXT_POOL[rng.gen_range(0..TEXT_POOL.len())])
}

pub fn bool_literal(rng: &mut dyn RngCore) -> String {
    if rng.gen_bool(0.5) { "TRUE" } else { "FALSE" }.to_string()
}

pub fn like_pattern(rng: &mut dyn RngCore) -> String {
    quote(LIKE_PATTERNS[rng.gen_range(0..LIKE_PATTERNS.len())])
}

/// A literal of `ty`, or NULL with probability `null_ratio`.
pub fn literal(rng: &mut dyn RngCore, ty: DataType, null_ratio: f64) -> String {
    if rng.gen_bool(null_ratio.clamp(0.0, 1.0)) {
        return "NULL".to_string();
    }
    match ty {
        DataType::Int => int_literal(rng),
        DataType::Float => float_literal(rng),
        DataType::Text => text_literal(rng),
        DataType::Boolean => bool_literal(rng),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn quotes_are_doubled() {
        assert_eq!(quote("x'y"), "'x''y'");
    }

    #[test]
    fn literals_parse_as_their_type() {
        let mut rng = SmallRng::seed_from_u64(9);
        for _ in 0..200 {
            assert!(int_literal(&mut rng).parse::<i64>().is_ok());
            assert!(float_literal(&mut rng).parse::<f64>().is_ok());
            let text = text_literal(&mut rng);
            assert!(text.starts_with('\'') && text.ends_with('\''));
        }
    }

    #[test]
    fn null_ratio_one_is_always_null() {
        let mut rng = SmallRng::seed_from_u64(2);
        assert_eq!(literal(&mut rng, DataType::Int, 1.0), "NULL");
    }
}
