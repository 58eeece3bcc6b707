use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::model::{non_blank, NewWorkOrder, SplitState, WorkOrder};

/// Why a sub-order batch was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitRejection {
    #[error("the work order list to save must not be empty")]
    EmptyBatch,
    #[error("sub-order '{order_no}' names main order '{actual}', expected '{expected}'")]
    MixedMainOrders {
        order_no: String,
        expected: String,
        actual: String,
    },
    #[error("sub-order '{0}' cannot reuse the main order number")]
    SubOrderIsMain(String),
    #[error("order number '{0}' is used more than once")]
    DuplicateOrderNo(String),
    #[error("main order '{0}' does not exist")]
    MainOrderMissing(String),
    #[error("this main order has already been split")]
    AlreadySplit,
    #[error("parent order '{parent}' of sub-order '{order_no}' is neither in the batch nor in the family")]
    UnknownParent { order_no: String, parent: String },
    #[error("parent references in the batch form a cycle at '{0}'")]
    ParentCycle(String),
}

/// Decide whether `batch` may be saved as the decomposition of its main order.
///
/// `existing` is every stored order sharing the batch's main order.
pub fn validate_split(batch: &[NewWorkOrder], existing: &[WorkOrder]) -> Result<(), SplitRejection> {
    let first = batch.first().ok_or(SplitRejection::EmptyBatch)?;
    let main_order = first.main_order.as_str();

    for order in batch {
        if order.main_order != main_order {
            return Err(SplitRejection::MixedMainOrders {
                order_no: order.order_no.clone(),
                expected: main_order.to_string(),
                actual: order.main_order.clone(),
            });
        }
        if order.order_no == main_order {
            return Err(SplitRejection::SubOrderIsMain(order.order_no.clone()));
        }
    }

    if let Some(dup) = batch
        .iter()
        .map(|o| o.order_no.as_str())
        .chain(existing.iter().map(|o| o.order_no.as_str()))
        .duplicates()
        .next()
    {
        return Err(SplitRejection::DuplicateOrderNo(dup.to_string()));
    }

    let main = existing
        .iter()
        .find(|o| o.order_no == main_order && o.is_main())
        .ok_or_else(|| SplitRejection::MainOrderMissing(main_order.to_string()))?;

    if main.split_state == SplitState::Split {
        return Err(SplitRejection::AlreadySplit);
    }

    // Rows written before the split flag existed
    let existing_children = existing
        .iter()
        .filter(|o| o.main_order == main_order && !o.is_main())
        .count();
    if existing_children > 1 {
        return Err(SplitRejection::AlreadySplit);
    }

    check_batch_parents(batch, existing)
}

/// Every parent must resolve inside batch ∪ family, and following parents
/// upward from any batch entry must terminate.
fn check_batch_parents(batch: &[NewWorkOrder], existing: &[WorkOrder]) -> Result<(), SplitRejection> {
    let parents: HashMap<&str, Option<&str>> = existing
        .iter()
        .map(|o| (o.order_no.as_str(), o.parent()))
        .chain(
            batch
                .iter()
                .map(|o| (o.order_no.as_str(), non_blank(o.parent_order.as_deref()))),
        )
        .collect();

    for order in batch {
        let Some(parent) = non_blank(order.parent_order.as_deref()) else {
            continue;
        };
        if !parents.contains_key(parent) {
            return Err(SplitRejection::UnknownParent {
                order_no: order.order_no.clone(),
                parent: parent.to_string(),
            });
        }
    }

    for order in batch {
        let mut seen = HashSet::new();
        let mut current = Some(order.order_no.as_str());
        while let Some(order_no) = current {
            if !seen.insert(order_no) {
                return Err(SplitRejection::ParentCycle(order_no.to_string()));
            }
            current = parents.get(order_no).copied().flatten();
        }
    }

    Ok(())
}

/// Whether a sub-tree removal leaves the family without sub-orders,
/// in which case the main order returns to `Unsplit`.
pub fn releases_split(family: &[WorkOrder], removed: &[WorkOrder]) -> bool {
    let removed_ids: Vec<_> = removed.iter().map(|o| o.id).collect();
    family
        .iter()
        .filter(|o| !removed_ids.contains(&o.id))
        .all(WorkOrder::is_main)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_order(order_no: &str, main: &str, parent: Option<&str>) -> NewWorkOrder {
        NewWorkOrder {
            order_no: order_no.to_string(),
            main_order: main.to_string(),
            parent_order: parent.map(str::to_string),
            flow_code: None,
            workshop_code: None,
        }
    }

    fn stored(id: i64, order_no: &str, main: &str, parent: Option<&str>) -> WorkOrder {
        new_order(order_no, main, parent).into_work_order(id, SplitState::Unsplit)
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let existing = vec![stored(1, "M", "M", None)];
        assert_eq!(validate_split(&[], &existing), Err(SplitRejection::EmptyBatch));
        assert_eq!(
            SplitRejection::EmptyBatch.to_string(),
            "the work order list to save must not be empty"
        );
    }

    #[test]
    fn test_first_split_is_accepted() {
        let existing = vec![stored(1, "M", "M", None)];
        let batch = vec![
            new_order("M-1", "M", Some("M")),
            new_order("M-2", "M", Some("M")),
            new_order("M-1-1", "M", Some("M-1")),
        ];
        assert_eq!(validate_split(&batch, &existing), Ok(()));
    }

    #[test]
    fn test_second_split_is_rejected_by_row_count() {
        let existing = vec![
            stored(1, "M", "M", None),
            stored(2, "M-1", "M", Some("M")),
            stored(3, "M-2", "M", Some("M")),
        ];
        let batch = vec![new_order("M-3", "M", Some("M"))];
        let err = validate_split(&batch, &existing).unwrap_err();
        assert_eq!(err, SplitRejection::AlreadySplit);
        assert_eq!(err.to_string(), "this main order has already been split");
    }

    #[test]
    fn test_split_flag_rejects_even_with_single_child() {
        let mut main = stored(1, "M", "M", None);
        main.split_state = SplitState::Split;
        let existing = vec![main, stored(2, "M-1", "M", Some("M"))];
        let batch = vec![new_order("M-2", "M", Some("M"))];
        assert_eq!(validate_split(&batch, &existing), Err(SplitRejection::AlreadySplit));
    }

    #[test]
    fn test_batch_shape_errors() {
        let existing = vec![stored(1, "M", "M", None)];

        let mixed = vec![new_order("M-1", "M", None), new_order("N-1", "N", None)];
        assert!(matches!(
            validate_split(&mixed, &existing),
            Err(SplitRejection::MixedMainOrders { .. })
        ));

        let self_ref = vec![new_order("M", "M", None)];
        assert_eq!(
            validate_split(&self_ref, &existing),
            Err(SplitRejection::SubOrderIsMain("M".to_string()))
        );

        let dup = vec![new_order("M-1", "M", Some("M")), new_order("M-1", "M", Some("M"))];
        assert_eq!(
            validate_split(&dup, &existing),
            Err(SplitRejection::DuplicateOrderNo("M-1".to_string()))
        );
    }

    #[test]
    fn test_missing_main_order() {
        let batch = vec![new_order("Q-1", "Q", Some("Q"))];
        assert_eq!(
            validate_split(&batch, &[]),
            Err(SplitRejection::MainOrderMissing("Q".to_string()))
        );
    }

    #[test]
    fn test_parent_outside_batch_and_family_is_rejected() {
        let existing = vec![stored(1, "M", "M", None)];
        let batch = vec![
            new_order("M-1", "M", Some("M")),
            new_order("M-2", "M", Some("GHOST")),
        ];
        assert_eq!(
            validate_split(&batch, &existing),
            Err(SplitRejection::UnknownParent {
                order_no: "M-2".to_string(),
                parent: "GHOST".to_string(),
            })
        );

        // blank parents are roots, not dangling references
        let roots = vec![new_order("M-1", "M", Some(" ")), new_order("M-2", "M", None)];
        assert_eq!(validate_split(&roots, &existing), Ok(()));
    }

    #[test]
    fn test_cyclic_batch_is_rejected() {
        let existing = vec![stored(1, "M", "M", None)];
        let batch = vec![
            new_order("M-1", "M", Some("M")),
            new_order("M-2", "M", Some("M-3")),
            new_order("M-3", "M", Some("M-2")),
        ];
        assert!(matches!(
            validate_split(&batch, &existing),
            Err(SplitRejection::ParentCycle(_))
        ));
    }

    #[test]
    fn test_batch_cannot_close_a_loop_through_an_orphan() {
        let existing = vec![stored(1, "M", "M", None), stored(2, "M-X", "M", Some("M-9"))];
        let batch = vec![new_order("M-9", "M", Some("M-X"))];
        assert!(matches!(
            validate_split(&batch, &existing),
            Err(SplitRejection::ParentCycle(_))
        ));
    }

    #[test]
    fn test_releases_split_only_when_no_sub_orders_remain() {
        let family = vec![
            stored(1, "M", "M", None),
            stored(2, "M-1", "M", Some("M")),
            stored(3, "M-1-1", "M", Some("M-1")),
            stored(4, "M-2", "M", Some("M")),
        ];
        assert!(!releases_split(&family, &family[1..3]));
        assert!(releases_split(&family, &family[1..]));
    }
}
