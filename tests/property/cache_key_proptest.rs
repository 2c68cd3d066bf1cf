//! Property-based tests for canonical cache keys

use pattern_sync::shared::CacheKey;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn params() -> impl Strategy<Value = BTreeMap<String, i64>> {
    prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..6)
}

fn key_from(op: &str, pairs: &[(String, i64)]) -> CacheKey {
    pairs
        .iter()
        .fold(CacheKey::new([op]), |builder, (name, value)| {
            builder.param(name, *value)
        })
        .build()
}

proptest! {
    #[test]
    fn test_key_ignores_parameter_order(
        (ordered, shuffled) in params().prop_flat_map(|map| {
            let pairs: Vec<(String, i64)> = map.into_iter().collect();
            (Just(pairs.clone()), Just(pairs).prop_shuffle())
        })
    ) {
        prop_assert_eq!(key_from("patterns", &ordered), key_from("patterns", &shuffled));
    }

    #[test]
    fn test_different_values_never_collide(
        name in "[a-z]{1,8}",
        a in any::<i64>(),
        b in any::<i64>(),
    ) {
        prop_assume!(a != b);
        let left = CacheKey::new(["patterns"]).param(&name, a).build();
        let right = CacheKey::new(["patterns"]).param(&name, b).build();
        prop_assert_ne!(left, right);
    }

    #[test]
    fn test_string_values_cannot_forge_parameters(
        head in "[a-z]{0,6}",
        name in "[a-z]{1,6}",
    ) {
        prop_assume!(name != "q");
        let forged = CacheKey::new(["patterns"])
            .param("q", format!("{head}&{name}=1"))
            .build();
        let genuine = CacheKey::new(["patterns"])
            .param("q", head.as_str())
            .param(&name, 1)
            .build();
        prop_assert_ne!(forged, genuine);
    }
}
