//! Property-based tests for fallback chain ordering and list merging.

mod common;

use proptest::prelude::*;

use common::*;
use folio_market_data::{merge_list, FetchRequest, Orchestrator};

// =============================================================================
// Generators
// =============================================================================

/// One provider in a generated chain.
#[derive(Clone, Debug)]
struct Slot {
    priority: u8,
    open: bool,
    succeeds: bool,
}

fn arb_slot() -> impl Strategy<Value = Slot> {
    (0u8..5, prop::bool::weighted(0.3), prop::bool::weighted(0.2)).prop_map(
        |(priority, open, succeeds)| Slot {
            priority,
            open,
            succeeds,
        },
    )
}

fn arb_chain() -> impl Strategy<Value = Vec<Slot>> {
    prop::collection::vec(arb_slot(), 0..8)
}

/// Lists of short lowercase/uppercase keys so duplicates across lists are common.
fn arb_lists() -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(prop::collection::vec("[a-cA-C]{1,2}", 0..6), 0..4)
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
        .block_on(future)
}

/// Run one fallback call over the generated chain and return the names of
/// the attempted providers.
fn run_chain(orchestrator: &Orchestrator, chain: &[Slot]) -> (Vec<String>, Option<String>) {
    let providers: Vec<_> = chain
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            let name = format!("P{i}");
            if slot.open {
                for _ in 0..3 {
                    orchestrator.breakers().record_failure(&name);
                }
            }
            let provider = if slot.succeeds {
                Scripted::ok(&name, slot.priority, name.clone())
            } else {
                Scripted::<String>::failing(&name, slot.priority, server_error)
            };
            descriptor(&provider.arc())
        })
        .collect();

    let result = block_on(orchestrator.fetch_with_fallback(FetchRequest::new("KEY", providers)));
    let attempted = names(&result.metadata.providers_attempted)
        .into_iter()
        .map(String::from)
        .collect();
    (attempted, result.data)
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Providers are attempted in stable priority order, open circuits are
    /// never called, and the walk stops at the first success.
    #[test]
    fn prop_attempts_follow_priority_order(chain in arb_chain()) {
        let (orchestrator, _clock) = orchestrator();
        let (attempted, data) = run_chain(&orchestrator, &chain);

        let mut order: Vec<usize> = (0..chain.len()).collect();
        order.sort_by_key(|&i| chain[i].priority);

        let mut expected = Vec::new();
        let mut winner = None;
        for i in order {
            if chain[i].open {
                continue;
            }
            expected.push(format!("P{i}"));
            if chain[i].succeeds {
                winner = Some(format!("P{i}"));
                break;
            }
        }

        prop_assert_eq!(attempted, expected);
        prop_assert_eq!(data, winner);
    }

    /// Merged lists keep exactly one item per key, in first-seen order.
    #[test]
    fn prop_merge_keeps_first_occurrence(lists in arb_lists()) {
        let flat: Vec<String> = lists.iter().flatten().cloned().collect();
        let merged = merge_list(lists, |s: &String| s.to_lowercase());

        let mut expected: Vec<String> = Vec::new();
        for item in &flat {
            if !expected.iter().any(|e| e.to_lowercase() == item.to_lowercase()) {
                expected.push(item.clone());
            }
        }

        prop_assert_eq!(merged.deduplicated, expected.len() < flat.len());
        prop_assert_eq!(merged.value, expected);
    }
}
