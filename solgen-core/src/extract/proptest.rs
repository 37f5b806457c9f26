//! Property-based tests for the extraction chain using proptest.
//!
//! - Valid JSON is recovered by the direct strategy without sanitization
//! - Sanitization leaves valid JSON untouched
//! - A valid value inside a fenced block survives arbitrary surrounding prose

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use serde_json::Value;

    use crate::extract::{extract, sanitize_json, ExtractionOutcome, ExtractionStrategy};

    // Flat objects of string values; no backticks so fences stay intact.
    fn json_object() -> impl Strategy<Value = BTreeMap<String, String>> {
        prop::collection::btree_map("[a-zA-Z_][a-zA-Z0-9_]{0,10}", "[^`\\p{C}]{0,24}", 0..6)
    }

    // Commentary without JSON delimiters or fences.
    fn prose() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 .,:!?'-]{0,60}"
    }

    proptest! {
        /// Valid JSON is recovered by the direct strategy, unsanitized.
        #[test]
        fn valid_json_is_direct(map in json_object()) {
            let text = serde_json::to_string(&map).unwrap();
            let outcome: ExtractionOutcome<BTreeMap<String, String>> = extract(&text);
            match outcome {
                ExtractionOutcome::Extracted { strategy, sanitized, value } => {
                    prop_assert_eq!(strategy, ExtractionStrategy::Direct);
                    prop_assert!(!sanitized);
                    prop_assert_eq!(value, map);
                }
                ExtractionOutcome::Failed { reason } => {
                    prop_assert!(false, "extraction failed: {}", reason);
                }
            }
        }

        /// Sanitizing valid JSON is the identity.
        #[test]
        fn sanitize_preserves_valid_json(map in json_object(), pretty in any::<bool>()) {
            let text = if pretty {
                serde_json::to_string_pretty(&map).unwrap()
            } else {
                serde_json::to_string(&map).unwrap()
            };
            prop_assert_eq!(sanitize_json(&text), text);
        }

        /// A fenced value is found regardless of the prose around it.
        #[test]
        fn fenced_block_survives_prose(
            map in json_object(),
            before in prose(),
            after in prose(),
            labelled in any::<bool>()
        ) {
            let fence = if labelled { "```json" } else { "```" };
            let text = format!(
                "{}\n{}\n{}\n```\n{}",
                before,
                fence,
                serde_json::to_string_pretty(&map).unwrap(),
                after
            );
            let outcome: ExtractionOutcome<Value> = extract(&text);
            prop_assert_eq!(outcome.strategy(), Some(ExtractionStrategy::FencedBlock));
            prop_assert_eq!(outcome.value(), Some(serde_json::to_value(&map).unwrap()));
        }
    }
}
