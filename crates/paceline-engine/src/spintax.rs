// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Nested-variant ("spintax") expansion: `{a|b|{c|d}}` resolves to one alternative.

use std::sync::LazyLock;

use rand::Rng;
use rand::seq::SliceRandom;
use regex::Regex;

/// Matches an innermost brace group (one that contains no braces itself).
static INNERMOST_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]*)\}").expect("static regex is valid"));

/// Resolves every brace group, innermost first, until none remain.
///
/// Unbalanced braces are left as literal text.
pub fn expand<R: Rng + ?Sized>(template: &str, rng: &mut R) -> String {
    let mut text = template.to_string();
    while let Some(caps) = INNERMOST_GROUP.captures(&text) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let alternatives: Vec<&str> = body.as_str().split('|').collect();
        let chosen = alternatives.choose(rng).copied().unwrap_or_default().to_string();
        text.replace_range(whole.range(), &chosen);
    }
    text
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn plain_text_untouched() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(expand("no variants here", &mut rng), "no variants here");
    }

    #[test]
    fn nested_groups_resolve() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let out = expand("{a|{b|c}}", &mut rng);
            assert!(["a", "b", "c"].contains(&out.as_str()), "got {out}");
        }
    }

    #[test]
    fn all_combinations_reachable() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(expand("Hi {A|B}, {nice|great} day", &mut rng));
        }
        assert_eq!(seen.len(), 4, "got {seen:?}");
    }

    #[test]
    fn unbalanced_brace_kept_literally() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(expand("smile :{", &mut rng), "smile :{");
        assert_eq!(expand("{x} and {", &mut rng), "x and {");
    }

    proptest! {
        #[test]
        fn greeting_yields_one_of_four(seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let out = expand("Hi {A|B}, {nice|great} day", &mut rng);
            let valid = [
                "Hi A, nice day",
                "Hi A, great day",
                "Hi B, nice day",
                "Hi B, great day",
            ];
            prop_assert!(valid.contains(&out.as_str()));
            prop_assert!(!out.contains('{') && !out.contains('}'), "output contains braces: {}", out);
        }

        #[test]
        fn balanced_input_leaves_no_braces(
            parts in proptest::collection::vec("[a-z ]{0,5}", 1..5),
            seed in any::<u64>(),
        ) {
            let template = format!("{{{}}} {{x|{{y|z}}}}", parts.join("|"));
            let mut rng = StdRng::seed_from_u64(seed);
            let out = expand(&template, &mut rng);
            prop_assert!(!out.contains('{') && !out.contains('}'), "output contains braces: {}", out);
        }
    }
}
