//! Property tests for convention ordering and tag filtering

use std::sync::Arc;

use errmap_composition::{ExceptionMapper, MappingMetadata, MetadataPolicy};
use errmap_core::{Handling, MappingContext, Outcome};
use futures::executor::block_on;
use parking_lot::Mutex;
use proptest::prelude::*;

#[derive(Debug, thiserror::Error)]
#[error("argument error")]
struct ArgumentError;

/// Indices of conventions in the order a stable sort by `orders` visits them
fn expected_sequence(orders: &[i32]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..orders.len()).collect();
    indices.sort_by_key(|&index| orders[index]);
    indices
}

proptest! {
    #[test]
    fn conventions_run_sorted_by_order_then_registration(
        orders in prop::collection::vec(-3i32..3, 0..8),
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut builder = ExceptionMapper::builder();
        let collection = builder.add_convention_scheme("s1").unwrap();
        for (index, order) in orders.iter().copied().enumerate() {
            let seen = seen.clone();
            collection
                .map_all(move |_| {
                    seen.lock().push(index);
                    Outcome::skip()
                })
                .set_order(order);
        }
        let mapper = builder.build().unwrap();

        let outcome = block_on(mapper.dispatch(Arc::new(ArgumentError)));

        prop_assert_eq!(outcome.handling(), Handling::Rethrow);
        prop_assert_eq!(seen.lock().clone(), expected_sequence(&orders));
    }

    #[test]
    fn first_deciding_convention_stops_iteration(
        orders in prop::collection::vec(-3i32..3, 1..8),
        decider in any::<prop::sample::Index>(),
    ) {
        let decider = decider.index(orders.len());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut builder = ExceptionMapper::builder();
        let collection = builder.add_convention_scheme("s1").unwrap();
        for (index, order) in orders.iter().copied().enumerate() {
            let seen = seen.clone();
            collection
                .map_all(move |_| {
                    seen.lock().push(index);
                    if index == decider {
                        Outcome::returning(index)
                    } else {
                        Outcome::skip()
                    }
                })
                .set_order(order);
        }
        let mapper = builder.build().unwrap();

        let outcome = block_on(mapper.dispatch(Arc::new(ArgumentError)));

        let expected: Vec<usize> = expected_sequence(&orders)
            .into_iter()
            .take_while(|&index| index != decider)
            .chain(std::iter::once(decider))
            .collect();
        prop_assert_eq!(outcome.downcast_return::<usize>(), Some(&decider));
        prop_assert_eq!(seen.lock().clone(), expected);
    }

    #[test]
    fn tag_filter_runs_convention_iff_sets_overlap_or_filter_empty(
        convention_tags in prop::collection::btree_set("[a-d]", 0..3),
        filter in prop::collection::btree_set("[a-d]", 0..3),
    ) {
        let mut builder = ExceptionMapper::builder();
        builder
            .add_convention_scheme_with("s1", |options| {
                options.policy = Some(Arc::new(MetadataPolicy));
            })
            .unwrap()
            .map_all(|_| Outcome::handled())
            .set_tags(convention_tags.clone());
        let mapper = builder.build().unwrap();

        let mut mapping = MappingContext::new();
        mapping
            .data_mut()
            .insert(MappingMetadata::new().with_tags(filter.clone()));
        let outcome = block_on(mapper.dispatch_with(Arc::new(ArgumentError), &mut mapping));

        let admitted = filter.is_empty()
            || filter.intersection(&convention_tags).next().is_some();
        let expected = if admitted { Handling::Handled } else { Handling::Rethrow };
        prop_assert_eq!(outcome.handling(), expected);
    }
}

#[test]
fn expected_sequence_is_stable() {
    assert_eq!(expected_sequence(&[10, 0, 5]), vec![1, 2, 0]);
    assert_eq!(expected_sequence(&[1, 0, 1, 0]), vec![1, 3, 0, 2]);
    assert!(expected_sequence(&[]).is_empty());
}
