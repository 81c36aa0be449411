// Pending Set Tests
// Reassembly of out-of-order set members

use fileset_mesh::model::{File, SetId};
use fileset_mesh::protocol::{AggregatorConfig, Completion, PendingSetAggregator};
use std::sync::Arc;
use std::time::Duration;

fn file(set: &str, count: usize, number: usize) -> File {
    File::new(set.into(), count, number, format!("{}:{}", set, number).into_bytes())
}

// ============================================================================
// COMPLETENESS
// ============================================================================

#[test]
fn test_complete_only_after_every_position() {
    let aggregator = PendingSetAggregator::default();
    let set: SetId = "s".into();

    for number in [3, 0, 2] {
        aggregator.add_file(file("s", 4, number));
        assert!(!aggregator.is_complete(&set));
    }
    aggregator.add_file(file("s", 4, 1));
    assert!(aggregator.is_complete(&set));
}

#[test]
fn test_remove_and_sort_orders_and_clears() {
    let aggregator = PendingSetAggregator::default();
    let set: SetId = "s".into();
    for number in [4, 1, 3, 0, 2] {
        aggregator.add_file(file("s", 5, number));
    }

    let files = aggregator.remove_and_sort(&set);
    let numbers: Vec<usize> = files.iter().map(|f| f.file_number()).collect();
    assert_eq!(numbers, vec![0, 1, 2, 3, 4]);

    assert_eq!(aggregator.pending_files(&set), 0);
    assert_eq!(aggregator.pending_sets(), 0);
    assert!(aggregator.remove_and_sort(&set).is_empty());
}

#[test]
fn test_retransmission_does_not_complete_early() {
    let aggregator = PendingSetAggregator::default();
    let set: SetId = "s".into();

    aggregator.add_file(file("s", 2, 0));
    aggregator.add_file(file("s", 2, 0));

    assert!(!aggregator.is_complete(&set));
    assert_eq!(aggregator.pending_files(&set), 1);
    assert_eq!(
        aggregator.take_complete(&set),
        Completion::Incomplete {
            expected: 2,
            found: 1
        }
    );
}

#[test]
fn test_take_complete_returns_sorted_members() {
    let aggregator = PendingSetAggregator::default();
    let set: SetId = "s".into();
    aggregator.add_file(file("s", 2, 1));
    aggregator.add_file(file("s", 2, 0));

    match aggregator.take_complete(&set) {
        Completion::Complete(files) => {
            assert_eq!(files, vec![file("s", 2, 0), file("s", 2, 1)]);
        }
        other => panic!("expected complete set, got {:?}", other),
    }
    assert_eq!(aggregator.pending_sets(), 0);
}

#[test]
fn test_count_disagreement_is_corrupted() {
    let aggregator = PendingSetAggregator::default();
    let set: SetId = "s".into();
    aggregator.add_file(file("s", 2, 0));
    aggregator.add_file(file("s", 3, 1));

    assert!(!aggregator.is_complete(&set));
    assert!(matches!(aggregator.take_complete(&set), Completion::Corrupted(_)));
    assert_eq!(aggregator.pending_sets(), 0);
}

#[test]
fn test_out_of_range_position_is_corrupted() {
    let aggregator = PendingSetAggregator::default();
    aggregator.add_file(file("s", 1, 1));
    assert!(matches!(
        aggregator.take_complete(&"s".into()),
        Completion::Corrupted(_)
    ));
}

#[test]
fn test_unknown_set_is_incomplete() {
    let aggregator = PendingSetAggregator::default();
    assert!(!aggregator.is_complete(&"ghost".into()));
    assert_eq!(
        aggregator.take_complete(&"ghost".into()),
        Completion::Incomplete {
            expected: 0,
            found: 0
        }
    );
}

// ============================================================================
// BOUNDS
// ============================================================================

#[test]
fn test_cap_evicts_least_recently_active() {
    let aggregator =
        PendingSetAggregator::new(AggregatorConfig::new().with_max_pending_sets(2));

    aggregator.add_file(file("old", 3, 0));
    std::thread::sleep(Duration::from_millis(2));
    aggregator.add_file(file("busy", 3, 0));
    std::thread::sleep(Duration::from_millis(2));
    aggregator.add_file(file("old", 3, 1));
    std::thread::sleep(Duration::from_millis(2));
    aggregator.add_file(file("new", 3, 0));

    assert_eq!(aggregator.pending_sets(), 2);
    assert_eq!(aggregator.pending_files(&"old".into()), 2);
    assert_eq!(aggregator.pending_files(&"busy".into()), 0);
    assert_eq!(aggregator.pending_files(&"new".into()), 1);
}

#[test]
fn test_evict_and_expire() {
    let aggregator = PendingSetAggregator::new(
        AggregatorConfig::new().with_pending_ttl(Duration::from_millis(20)),
    );
    aggregator.add_file(file("a", 2, 0));
    aggregator.add_file(file("b", 2, 0));

    assert!(aggregator.evict(&"a".into()));
    assert!(!aggregator.evict(&"a".into()));

    std::thread::sleep(Duration::from_millis(40));
    aggregator.add_file(file("c", 2, 0));
    assert_eq!(aggregator.evict_expired(), 1);
    assert_eq!(aggregator.pending_sets(), 1);
    assert_eq!(aggregator.pending_files(&"c".into()), 1);
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[test]
fn test_concurrent_adders_complete_exactly_once() {
    let aggregator = Arc::new(PendingSetAggregator::default());
    let count = 64;

    let handles: Vec<_> = (0..count)
        .map(|number| {
            let aggregator = aggregator.clone();
            std::thread::spawn(move || {
                aggregator.add_file(file("race", count, number));
                matches!(aggregator.take_complete(&"race".into()), Completion::Complete(_))
            })
        })
        .collect();

    let completions = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|done| *done)
        .count();
    assert_eq!(completions, 1);
}
