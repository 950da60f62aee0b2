// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for the Addon Operator
//!
//! These tests use proptest to generate random inputs and verify that:
//! 1. Adoption decisions never hand an object to the wrong revision
//! 2. Template hashing is deterministic and stays inside its alphabet
//! 3. Backoff delays respect their configured bounds
//! 4. The CSV remap table's reverse index always matches the last replace

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use proptest::prelude::*;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::ObjectMeta;

use addon_operator::controller::csv_events::{CsvEventTable, CsvKey};
use addon_operator::controller::BackoffConfig;
use addon_operator::crd::{
    ObjectSetObject, ObjectSetTemplatePhase, ObjectSetTemplateSpec, REVISION_ANNOTATION,
};
use addon_operator::objectset::{check_adoption, compute_hash, AdoptionDecision};

const SAFE_ALPHABET: &str = "bcdfghjklmnpqrstvwxz2456789";

fn meta_with_owner(controller_uid: &str, revision: i64) -> ObjectMeta {
    ObjectMeta {
        name: Some("obj".to_string()),
        namespace: Some("ns".to_string()),
        annotations: Some(BTreeMap::from([(
            REVISION_ANNOTATION.to_string(),
            revision.to_string(),
        )])),
        owner_references: Some(vec![OwnerReference {
            api_version: "package-operator.run/v1alpha1".to_string(),
            kind: "ObjectSet".to_string(),
            name: "owner".to_string(),
            uid: controller_uid.to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]),
        ..Default::default()
    }
}

fn uid_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}-uid"
}

fn template_strategy() -> impl Strategy<Value = ObjectSetTemplateSpec> {
    (
        prop::collection::vec("[a-z]{1,12}", 0..4),
        prop::collection::vec("[a-z0-9]{1,16}", 0..3),
    )
        .prop_map(|(phase_names, object_names)| ObjectSetTemplateSpec {
            phases: phase_names
                .into_iter()
                .map(|name| ObjectSetTemplatePhase {
                    name,
                    class: None,
                    objects: object_names
                        .iter()
                        .map(|object_name| ObjectSetObject {
                            object: serde_json::json!({
                                "apiVersion": "v1",
                                "kind": "ConfigMap",
                                "metadata": {"name": object_name},
                            }),
                        })
                        .collect(),
                })
                .collect(),
            availability_probes: vec![],
        })
}

proptest! {
    #[test]
    fn adoption_never_steals_from_unlisted_owners(
        owner_uid in uid_strategy(),
        controller_uid in uid_strategy(),
        previous in prop::collection::hash_set(uid_strategy(), 0..5),
        owner_revision in 1i64..100,
        object_revision in 0i64..100,
    ) {
        prop_assume!(owner_uid != controller_uid);

        let meta = meta_with_owner(&controller_uid, object_revision);
        let previous: HashSet<String> = previous;

        if let Ok(AdoptionDecision::Adopt) =
            check_adoption(&owner_uid, owner_revision, &meta, &previous)
        {
            // Adoption only ever happens from a listed predecessor with a
            // strictly older revision
            prop_assert!(previous.contains(&controller_uid));
            prop_assert!(object_revision < owner_revision);
        }
    }

    #[test]
    fn adoption_is_deterministic(
        owner_uid in uid_strategy(),
        controller_uid in uid_strategy(),
        owner_revision in 1i64..100,
        object_revision in 0i64..100,
    ) {
        let meta = meta_with_owner(&controller_uid, object_revision);
        let previous = HashSet::from([controller_uid.clone()]);

        let first = check_adoption(&owner_uid, owner_revision, &meta, &previous);
        let second = check_adoption(&owner_uid, owner_revision, &meta, &previous);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn hash_is_deterministic_and_safe(
        template in template_strategy(),
        collision_count in prop::option::of(0i32..10),
    ) {
        let first = compute_hash(&template, collision_count);
        let second = compute_hash(&template, collision_count);
        prop_assert_eq!(&first, &second);

        prop_assert_eq!(first.len(), 4);
        prop_assert!(first.chars().all(|c| SAFE_ALPHABET.contains(c)));
    }

    #[test]
    fn backoff_delays_stay_in_bounds(attempt in 0u32..20) {
        let cfg = BackoffConfig::default();
        let delay = cfg.delay_for_attempt(attempt);

        // Jitter is at most 10% of the base, which itself caps at max_delay
        let upper = cfg.max_delay.mul_f64(1.0 + cfg.jitter);
        prop_assert!(delay <= upper);
        prop_assert!(delay >= Duration::ZERO);

        if attempt == 0 {
            prop_assert!(delay >= cfg.initial_delay.mul_f64(1.0 - cfg.jitter));
        }
    }

    #[test]
    fn remap_reverse_index_matches_last_replace(
        keys_a in prop::collection::vec(("[a-z]{1,6}", "[a-z0-9.]{1,10}"), 0..6),
        keys_b in prop::collection::vec(("[a-z]{1,6}", "[a-z0-9.]{1,10}"), 0..6),
    ) {
        let table = CsvEventTable::new();
        let keys_a: Vec<CsvKey> = keys_a.iter().map(|(ns, n)| CsvKey::new(ns, n)).collect();
        let keys_b: Vec<CsvKey> = keys_b.iter().map(|(ns, n)| CsvKey::new(ns, n)).collect();

        table.replace_map("addon-a", &keys_a);
        table.replace_map("addon-b", &keys_b);

        let b_set: HashSet<&CsvKey> = keys_b.iter().collect();
        for key in &keys_b {
            prop_assert_eq!(table.addon_for(key), Some("addon-b".to_string()));
        }
        for key in &keys_a {
            if !b_set.contains(key) {
                prop_assert_eq!(table.addon_for(key), Some("addon-a".to_string()));
            }
        }

        table.free("addon-a");
        for key in &keys_a {
            if !b_set.contains(key) {
                prop_assert_eq!(table.addon_for(key), None);
            }
        }
    }
}
