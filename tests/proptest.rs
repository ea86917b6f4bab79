//! Property tests for the schema runtime.

use std::collections::BTreeMap;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};

use oas_enforcer::{
    inject, Enforcer, RandomOptions, Replacement, SchemaNode, TypedValue, Version,
};

fn schema(definition: Value) -> SchemaNode {
    Enforcer::new(Version::V3_0_3)
        .schema(&definition)
        .into_result()
        .expect("test schema is valid")
}

proptest! {
    /// deserialize ∘ serialize is the identity on valid date strings.
    #[test]
    fn date_round_trips(year in 1970i32..2100, month in 1u32..=12, day in 1u32..=28) {
        let node = schema(json!({"type": "string", "format": "date"}));
        let wire = json!(format!("{:04}-{:02}-{:02}", year, month, day));
        let typed = node.deserialize(&wire).into_result().expect("valid date");
        prop_assert!(node.validate(&typed).is_ok());
        let back = node.serialize(&typed).into_result().expect("serializable");
        prop_assert_eq!(back, wire);
    }

    /// deserialize ∘ serialize is the identity on base64 payloads.
    #[test]
    fn byte_round_trips(payload in proptest::collection::vec(any::<u8>(), 0..64)) {
        use base64::Engine;
        let node = schema(json!({"type": "string", "format": "byte"}));
        let wire = json!(base64::engine::general_purpose::STANDARD.encode(&payload));
        let typed = node.deserialize(&wire).into_result().expect("valid base64");
        prop_assert_eq!(&typed, &TypedValue::Bytes(payload));
        let back = node.serialize(&typed).into_result().expect("serializable");
        prop_assert_eq!(back, wire);
    }

    /// Every generated value validates against its schema when extra
    /// properties are disabled.
    #[test]
    fn random_values_validate(seed in any::<u64>()) {
        let node = schema(json!({
            "type": "object",
            "required": ["id", "tags"],
            "properties": {
                "id": {"type": "integer", "minimum": 1, "maximum": 100000},
                "score": {"type": "number", "minimum": 0, "maximum": 1},
                "tags": {
                    "type": "array",
                    "minItems": 1,
                    "maxItems": 5,
                    "items": {"type": "string", "minLength": 1, "maxLength": 8}
                },
                "state": {"type": "string", "enum": ["new", "open", "done"]},
                "when": {"type": "string", "format": "date"}
            }
        }));
        let mut rng = StdRng::seed_from_u64(seed);
        let value = node
            .random_with_rng(None, &RandomOptions::default(), &mut rng)
            .into_result()
            .expect("generation succeeds");
        let outcome = node.validate(&value);
        prop_assert!(
            outcome.is_ok(),
            "seed {} produced invalid value: {}",
            seed,
            outcome.error.map(|e| e.to_string()).unwrap_or_default()
        );
    }

    /// formalize is idempotent on plain trees.
    #[test]
    fn formalize_is_idempotent(tree in plain_json()) {
        let node = schema(json!({"type": "object"}));
        let value = TypedValue::from_json(&tree);
        let once = node.formalize(&value);
        let twice = node.formalize(&once);
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(&once, &value);
    }

    /// Injection with no parameters defined leaves templates verbatim.
    #[test]
    fn injection_without_params_is_identity(template in "[a-z {}:]{0,40}") {
        let params = BTreeMap::new();
        prop_assert_eq!(inject(&template, &params, Replacement::Handlebar), template.clone());
        prop_assert_eq!(inject(&template, &params, Replacement::Colon), template);
    }
}

fn plain_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-z]{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            proptest::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(|map| {
                Value::Object(map.into_iter().collect())
            }),
        ]
    })
}
