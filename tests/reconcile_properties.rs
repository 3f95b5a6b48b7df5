use std::collections::BTreeMap;

use hemmer_provider_fastly::logging_kafka::KafkaHandler;
use hemmer_provider_fastly::service::{
    ServiceAttributeHandler, ServiceMetadata, ServiceType, ServiceVersion,
};
use hemmer_provider_fastly::testing::{ApiCall, InMemoryFastly};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Endpoint sets keyed by name, so names are unique by construction.
fn endpoint_set() -> impl Strategy<Value = BTreeMap<String, (String, bool)>> {
    prop::collection::btree_map(
        "[a-e]",
        ("(logs|audit|errors)", any::<bool>()),
        0..5,
    )
}

fn records(handler: &KafkaHandler, set: &BTreeMap<String, (String, bool)>) -> Vec<Value> {
    let block = handler.block();
    set.iter()
        .map(|(name, (topic, use_tls))| {
            block.normalize(json!({
                "name": name,
                "topic": topic,
                "brokers": "b:9092",
                "use_tls": use_tls
            }))
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_process_converges_remote_to_desired(
        old in endpoint_set(),
        new in endpoint_set(),
        vcl in any::<bool>(),
    ) {
        let service_type = if vcl { ServiceType::Vcl } else { ServiceType::Compute };
        let handler = KafkaHandler::new(ServiceMetadata::new(service_type));
        let version = ServiceVersion::new("svc", 1);
        let api = InMemoryFastly::new();
        let old = records(&handler, &old);
        let new = records(&handler, &new);

        tokio_test::block_on(async {
            handler.process(&api, &version, &[], &old).await.unwrap();
            api.clear_calls();
            handler.process(&api, &version, &old, &new).await.unwrap();
        });

        let read = tokio_test::block_on(handler.read(&api, &version)).unwrap();
        prop_assert_eq!(read, new.clone());

        // Unchanged records never cost an API call.
        let unchanged = new.iter().filter(|r| old.contains(r)).count();
        let calls = api
            .calls()
            .into_iter()
            .filter(|c| !matches!(c, ApiCall::List(_)))
            .count();
        prop_assert!(calls <= old.len() + new.len() - 2 * unchanged);
    }
}
