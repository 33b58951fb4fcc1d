//! Numeric-range codec for ifgroup membership expressions.
//!
//! VFAB VLAN rows encode their ifgroup sets as comma-separated tokens
//! where each token is a single id (`10`) or an inclusive range
//! (`3-7`). The encoder always produces the minimal token count, so
//! inserting an id adjacent to a range extends the range instead of
//! appending a token, and removing an id from inside a range splits it
//! into at most two tokens.

use std::collections::BTreeSet;

use fabric_common::{FabricError, FabricResult};

/// Decodes an encoded expression into the set it denotes.
pub fn decode(encoded: &str) -> FabricResult<BTreeSet<u16>> {
    let mut set = BTreeSet::new();
    for token in encoded.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match token.split_once('-') {
            Some((lo, hi)) => {
                let lo: u16 = parse_id(lo)?;
                let hi: u16 = parse_id(hi)?;
                if lo > hi {
                    return Err(FabricError::invalid_config(
                        "ifgroup range",
                        format!("descending range '{}'", token),
                    ));
                }
                set.extend(lo..=hi);
            }
            None => {
                set.insert(parse_id(token)?);
            }
        }
    }
    Ok(set)
}

/// Encodes a set with the minimal number of tokens.
pub fn encode(set: &BTreeSet<u16>) -> String {
    let mut tokens: Vec<String> = Vec::new();
    let mut run: Option<(u16, u16)> = None;
    for &v in set {
        run = match run {
            Some((lo, hi)) if v == hi + 1 => Some((lo, v)),
            Some((lo, hi)) => {
                tokens.push(run_token(lo, hi));
                Some((v, v))
            }
            None => Some((v, v)),
        };
    }
    if let Some((lo, hi)) = run {
        tokens.push(run_token(lo, hi));
    }
    tokens.join(",")
}

/// Inserts `id` into an encoded expression.
pub fn insert_val(encoded: &str, id: u16) -> FabricResult<String> {
    let mut set = decode(encoded)?;
    set.insert(id);
    Ok(encode(&set))
}

/// Removes `id` from an encoded expression.
pub fn eliminate_val(encoded: &str, id: u16) -> FabricResult<String> {
    let mut set = decode(encoded)?;
    set.remove(&id);
    Ok(encode(&set))
}

/// Tests membership without materializing the full set: literal
/// tokens are compared directly, range tokens by interval.
pub fn contains_val(encoded: &str, id: u16) -> FabricResult<bool> {
    for token in encoded.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match token.split_once('-') {
            Some((lo, hi)) => {
                if (parse_id(lo)?..=parse_id(hi)?).contains(&id) {
                    return Ok(true);
                }
            }
            None => {
                if parse_id(token)? == id {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

fn parse_id(s: &str) -> FabricResult<u16> {
    s.trim().parse().map_err(|_| {
        FabricError::invalid_config("ifgroup range", format!("invalid id '{}'", s))
    })
}

fn run_token(lo: u16, hi: u16) -> String {
    if lo == hi {
        format!("{}", lo)
    } else {
        format!("{}-{}", lo, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u16]) -> BTreeSet<u16> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode("3-7,10").unwrap(), set(&[3, 4, 5, 6, 7, 10]));
        assert_eq!(decode("0").unwrap(), set(&[0]));
        assert_eq!(decode("").unwrap(), set(&[]));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("a-b").is_err());
        assert!(decode("7-3").is_err());
    }

    #[test]
    fn test_encode_minimal() {
        assert_eq!(encode(&set(&[3, 4, 5, 6, 7, 10])), "3-7,10");
        assert_eq!(encode(&set(&[1, 2])), "1-2");
        assert_eq!(encode(&set(&[1, 3])), "1,3");
        assert_eq!(encode(&set(&[])), "");
    }

    #[test]
    fn test_roundtrip() {
        for encoded in ["0", "3-7,10", "1-2,4,6-9,4094", ""] {
            let decoded = decode(encoded).unwrap();
            assert_eq!(decode(&encode(&decoded)).unwrap(), decoded);
        }
    }

    #[test]
    fn test_reencode_never_grows_token_count() {
        for encoded in ["1,2,3", "1-1,2-2", "5,3-4", "0,1,2,3,10"] {
            let reencoded = encode(&decode(encoded).unwrap());
            let before = encoded.split(',').count();
            let after = reencoded.split(',').count();
            assert!(after <= before, "{} -> {}", encoded, reencoded);
        }
    }

    #[test]
    fn test_insert_extends_adjacent_range() {
        assert_eq!(insert_val("3-7,10", 8).unwrap(), "3-8,10");
        assert_eq!(insert_val("3-7,10", 2).unwrap(), "2-7,10");
        // Bridging two runs collapses them
        assert_eq!(insert_val("3-7,9-10", 8).unwrap(), "3-10");
        // Far id appends
        assert_eq!(insert_val("3-7", 100).unwrap(), "3-7,100");
    }

    #[test]
    fn test_eliminate_splits_range() {
        assert_eq!(eliminate_val("3-7", 5).unwrap(), "3-4,6-7");
        assert_eq!(eliminate_val("3-7", 3).unwrap(), "4-7");
        assert_eq!(eliminate_val("3-7", 7).unwrap(), "3-6");
        assert_eq!(eliminate_val("5", 5).unwrap(), "");
        // Absent id leaves the set unchanged
        assert_eq!(eliminate_val("3-7", 10).unwrap(), "3-7");
    }

    #[test]
    fn test_elimination_law() {
        let original = set(&[0, 2, 3, 4, 9]);
        let encoded = encode(&original);
        for &id in &[0u16, 3, 9, 100] {
            let mut expected = original.clone();
            expected.remove(&id);
            assert_eq!(decode(&eliminate_val(&encoded, id).unwrap()).unwrap(), expected);
        }
    }

    #[test]
    fn test_contains_val() {
        assert!(contains_val("3-7,10", 5).unwrap());
        assert!(contains_val("3-7,10", 10).unwrap());
        assert!(contains_val("3-7,10", 3).unwrap());
        assert!(!contains_val("3-7,10", 8).unwrap());
        assert!(!contains_val("", 1).unwrap());
    }
}
