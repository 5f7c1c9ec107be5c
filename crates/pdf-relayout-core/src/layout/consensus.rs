use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{Error, Result};

/// Pick the most frequent value.
///
/// Ties go to the value whose first occurrence comes earliest, so the
/// result only depends on the order of the input.
pub fn consensus<V, I>(values: I) -> Result<V>
where
    I: IntoIterator<Item = V>,
    V: Eq + Hash + Clone,
{
    // value -> (count, first position)
    let mut tally: HashMap<V, (usize, usize)> = HashMap::new();
    for (position, value) in values.into_iter().enumerate() {
        tally.entry(value).or_insert((0, position)).0 += 1;
    }

    tally
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(value, _)| value)
        .ok_or(Error::EmptyInput("consensus over no values"))
}

/// Consensus over font sizes, compared bit for bit.
pub fn consensus_size<I>(sizes: I) -> Result<f32>
where
    I: IntoIterator<Item = f32>,
{
    consensus(sizes.into_iter().map(f32::to_bits)).map(f32::from_bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_mode() {
        assert_eq!(consensus([3, 1, 3, 2, 3]).ok(), Some(3));
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        assert_eq!(consensus(["b", "a", "a", "b"]).ok(), Some("b"));
        assert_eq!(consensus(["x", "y", "z"]).ok(), Some("x"));
        // "c" reaches two first but "a" appeared earlier
        assert_eq!(consensus(["a", "c", "c", "a"]).ok(), Some("a"));
    }

    #[test]
    fn test_single_value() {
        assert_eq!(consensus([0x00FF_00u32]).ok(), Some(0x00FF_00));
    }

    #[test]
    fn test_empty_input_fails() {
        let empty: Vec<u32> = Vec::new();
        assert!(matches!(consensus(empty), Err(Error::EmptyInput(_))));
    }

    #[test]
    fn test_result_is_member_of_input() {
        let inputs: [&[&str]; 4] = [
            &["Helvetica"],
            &["Times", "Helvetica", "Times"],
            &["a", "b", "c", "d", "e"],
            &["z", "z", "y", "y", "x"],
        ];
        for input in inputs {
            let picked = consensus(input.iter().copied()).unwrap_or_default();
            assert!(input.contains(&picked), "{picked} not in {input:?}");
        }
    }

    #[test]
    fn test_deterministic() {
        let input = vec!["q", "r", "s", "r", "q", "s"];
        let first = consensus(input.clone()).ok();
        for _ in 0..20 {
            assert_eq!(consensus(input.clone()).ok(), first);
        }
        assert_eq!(first, Some("q"));
    }

    #[test]
    fn test_font_sizes() {
        assert_eq!(consensus_size([12.0, 10.5, 12.0]).ok(), Some(12.0));
        assert_eq!(consensus_size([9.0, 11.0]).ok(), Some(9.0));
        assert!(consensus_size([]).is_err());
    }
}
