#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use switchboard_core::{Priority, SwitchboardError};
use switchboard_routing::*;

fn fleet() -> CapabilityRegistry {
    let registry = CapabilityRegistry::new();
    registry
        .register(
            CapabilityProfile::new("support-1", 3)
                .with_capabilities(["technical_support"])
                .with_stats(92.0, 1200.0),
        )
        .unwrap();
    registry
        .register(
            CapabilityProfile::new("billing-1", 2)
                .with_capabilities(["billing"])
                .with_specializations(["refunds"])
                .with_stats(97.0, 800.0),
        )
        .unwrap();
    registry
        .register(
            CapabilityProfile::new("billing-2", 2)
                .with_capabilities(["billing"])
                .with_stats(85.0, 300.0),
        )
        .unwrap();
    registry
}

// ---------------------------------------------------------------------------
// 1. Classify -> list eligible -> rank picks the strongest billing worker
// ---------------------------------------------------------------------------

#[test]
fn classify_then_rank() {
    let registry = fleet();
    let classifier = RequestClassifier::default();
    let scorer = SelectionScorer::default();

    let classification = classifier.classify("I was charged twice, please refund my invoice", &[]);
    assert_eq!(classification.request_type, "billing_inquiry");

    let eligible = registry.list_eligible(&classification.required_capabilities);
    assert_eq!(eligible.len(), 2);

    let decision = scorer.rank(&eligible, &classification.required_capabilities, Priority::High);
    assert_eq!(decision.selected.as_deref(), Some("billing-1"));
    assert_eq!(decision.alternatives(), vec!["billing-2".to_string()]);
    assert!(decision.confidence > 0.0 && decision.confidence <= 1.0);
}

// ---------------------------------------------------------------------------
// 2. Load moves a worker out of the eligible set and back
// ---------------------------------------------------------------------------

#[test]
fn saturated_worker_drops_out_of_ranking() {
    let registry = fleet();
    let required = vec!["billing".to_string()];
    registry.adjust_load("billing-1", 1).unwrap();
    registry.adjust_load("billing-1", 1).unwrap();

    let eligible = registry.list_eligible(&required);
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].worker_id, "billing-2");

    registry.release("billing-1", true, 500.0).unwrap();
    assert_eq!(registry.list_eligible(&required).len(), 2);
}

// ---------------------------------------------------------------------------
// 3. Concurrent increments never push a worker past max_concurrent
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_respect_capacity() {
    let registry = Arc::new(fleet());
    let mut handles = Vec::new();
    for _ in 0..32 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move { registry.adjust_load("support-1", 1) }));
    }

    let mut ok = 0;
    let mut rejected = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => ok += 1,
            Err(SwitchboardError::CapacityExceeded { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(ok, 3);
    assert_eq!(rejected, 29);
    assert_eq!(registry.get("support-1").unwrap().current_load, 3);
}

// ---------------------------------------------------------------------------
// 4. Offline workers are skipped by eligibility and capability probes
// ---------------------------------------------------------------------------

#[test]
fn offline_worker_is_invisible_to_routing() {
    let registry = fleet();
    registry.set_offline("support-1", true).unwrap();
    let required = vec!["technical_support".to_string()];
    assert!(registry.list_eligible(&required).is_empty());
    assert!(registry.any_capable(&required, None).is_none());

    registry.set_offline("support-1", false).unwrap();
    assert_eq!(registry.list_eligible(&required).len(), 1);
}
