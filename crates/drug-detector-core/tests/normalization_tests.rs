//! Property and golden tests for boolean normalization.

use drug_detector_core::decision::{FALSE_TOKENS, TRUE_TOKENS};
use drug_detector_core::{str_to_bool, Decision};
use proptest::prelude::*;

/// Randomly re-case an ASCII token using a bit mask.
fn recase(token: &str, mask: u32) -> String {
    token
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if mask & (1 << (i % 32)) != 0 {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

#[test]
fn golden_tokens() {
    let cases = [
        ("True", Decision::Bool(true)),
        ("False", Decision::Bool(false)),
        ("yes", Decision::Bool(true)),
        ("No", Decision::Bool(false)),
        ("1", Decision::Bool(true)),
        ("0", Decision::Bool(false)),
        ("Y", Decision::Bool(true)),
        ("n", Decision::Bool(false)),
        ("truthy", Decision::Text("truthy".into())),
        ("2", Decision::Text("2".into())),
        ("True.", Decision::Text("True.".into())),
    ];

    for (input, expected) in cases {
        assert_eq!(str_to_bool(input), expected, "input: {:?}", input);
    }
}

proptest! {
    #[test]
    fn recognized_tokens_any_case(idx in 0usize..4, mask in any::<u32>(), truthy in any::<bool>()) {
        let token = if truthy { TRUE_TOKENS[idx] } else { FALSE_TOKENS[idx] };
        let input = recase(token, mask);
        prop_assert_eq!(str_to_bool(&input), Decision::Bool(truthy));
    }

    #[test]
    fn normalize_is_idempotent(s in ".*") {
        let once = Decision::Text(s).normalize();
        let twice = once.clone().normalize();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn unrecognized_strings_pass_through(s in "[a-zA-Z ]{2,12}") {
        let lower = s.to_lowercase();
        prop_assume!(!TRUE_TOKENS.contains(&lower.as_str()));
        prop_assume!(!FALSE_TOKENS.contains(&lower.as_str()));
        prop_assert_eq!(str_to_bool(&s), Decision::Text(s.clone()));
    }

    #[test]
    fn bools_are_unchanged(b in any::<bool>()) {
        prop_assert_eq!(Decision::Bool(b).normalize(), Decision::Bool(b));
    }
}
