//! Lookup-key normalization used by the managers.

/// Turns a user-facing name or email into the key stored for lookups.
pub trait LookupNormalizer: Send + Sync {
    fn normalize_name(&self, name: &str) -> String;

    fn normalize_email(&self, email: &str) -> String;
}

/// Default normalizer: upper-cases using Unicode case mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct UpperInvariantNormalizer;

impl LookupNormalizer for UpperInvariantNormalizer {
    fn normalize_name(&self, name: &str) -> String {
        name.to_uppercase()
    }

    fn normalize_email(&self, email: &str) -> String {
        email.to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn normalization_is_idempotent(name in "[a-zA-Z0-9 _.@-]{0,32}") {
            let once = UpperInvariantNormalizer.normalize_name(&name);
            let twice = UpperInvariantNormalizer.normalize_name(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn case_variants_share_a_key(name in "[a-zA-Z]{1,24}") {
            let lower = UpperInvariantNormalizer.normalize_name(&name.to_lowercase());
            let upper = UpperInvariantNormalizer.normalize_name(&name.to_uppercase());
            prop_assert_eq!(lower, upper);
        }
    }

    #[test]
    fn emails_are_upper_cased() {
        assert_eq!(
            UpperInvariantNormalizer.normalize_email("Alice@Example.com"),
            "ALICE@EXAMPLE.COM"
        );
    }
}
