//! Property-based tests for request fingerprints.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::{json, Value};

    use crate::request::Request;

    /// Strategy to generate identifier-like model/method names
    fn identifier_strategy() -> impl Strategy<Value = String> {
        proptest::string::string_regex("[a-z]{1,8}(\\.[a-z]{1,8})?")
            .expect("valid identifier regex")
    }

    /// Strategy to generate flat JSON argument lists
    fn args_strategy() -> impl Strategy<Value = Vec<Value>> {
        prop::collection::vec(
            prop_oneof![
                any::<i64>().prop_map(|n| json!(n)),
                any::<bool>().prop_map(|b| json!(b)),
                "[a-z0-9]{0,12}".prop_map(|s| json!(s)),
            ],
            0..5,
        )
    }

    proptest! {
        #[test]
        fn test_fingerprint_is_deterministic(
            model in identifier_strategy(),
            method in identifier_strategy(),
            args in args_strategy(),
        ) {
            let a = Request::new(model.clone(), method.clone(), args.clone());
            let b = Request::new(model, method, args);
            prop_assert_eq!(a.fingerprint(), b.fingerprint());
        }

        #[test]
        fn test_fingerprint_distinguishes_models(
            model in identifier_strategy(),
            method in identifier_strategy(),
            args in args_strategy(),
        ) {
            let a = Request::new(model.clone(), method.clone(), args.clone());
            let b = Request::new(format!("{model}.other"), method, args);
            prop_assert_ne!(a.fingerprint(), b.fingerprint());
        }

        #[test]
        fn test_fingerprint_distinguishes_appended_arguments(
            model in identifier_strategy(),
            method in identifier_strategy(),
            args in args_strategy(),
        ) {
            let mut longer = args.clone();
            longer.push(json!("extra"));
            let a = Request::new(model.clone(), method.clone(), args);
            let b = Request::new(model, method, longer);
            prop_assert_ne!(a.fingerprint(), b.fingerprint());
        }
    }
}
