//! Reference checks for single-order writes (create and PUT).
//!
//! A write must name a main order that exists, a parent inside that main
//! order's family, and must not close a loop in the parent forest. An order
//! that other rows point at keeps its `orderNo` and `mainOrder`.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::model::{non_blank, Id, WorkOrder, WorkOrderUpdate};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("main order '{0}' does not exist")]
    UnknownMainOrder(String),
    #[error("main order '{0}' cannot have a parent order")]
    MainOrderWithParent(String),
    #[error("parent order '{parent}' of '{order_no}' is not part of family '{main_order}'")]
    UnknownParent {
        order_no: String,
        parent: String,
        main_order: String,
    },
    #[error("making '{parent}' the parent of '{order_no}' would form a cycle")]
    ParentCycle { order_no: String, parent: String },
    #[error("work order '{0}' is still referenced by its sub-orders")]
    StillReferenced(String),
}

/// Check where an order would sit after being written.
///
/// `family` is every stored order sharing `main_order`. The row with
/// `own_id` is the one being replaced and is ignored.
pub fn check_placement(
    order_no: &str,
    main_order: &str,
    parent: Option<&str>,
    family: &[WorkOrder],
    own_id: Option<Id>,
) -> Result<(), ReferenceError> {
    let parent = non_blank(parent);

    if order_no == main_order {
        return match parent {
            Some(_) => Err(ReferenceError::MainOrderWithParent(order_no.to_string())),
            None => Ok(()),
        };
    }

    let others: Vec<&WorkOrder> = family.iter().filter(|o| Some(o.id) != own_id).collect();

    if !others.iter().any(|o| o.order_no == main_order && o.is_main()) {
        return Err(ReferenceError::UnknownMainOrder(main_order.to_string()));
    }

    let Some(parent) = parent else {
        return Ok(());
    };

    let parents: HashMap<&str, Option<&str>> = others
        .iter()
        .map(|o| (o.order_no.as_str(), o.parent()))
        .collect();
    if !parents.contains_key(parent) {
        return Err(ReferenceError::UnknownParent {
            order_no: order_no.to_string(),
            parent: parent.to_string(),
            main_order: main_order.to_string(),
        });
    }

    // Walk upward from the new parent; meeting the order itself closes a loop
    let mut seen = HashSet::new();
    let mut current = Some(parent);
    while let Some(ancestor) = current {
        if ancestor == order_no || !seen.insert(ancestor) {
            return Err(ReferenceError::ParentCycle {
                order_no: order_no.to_string(),
                parent: parent.to_string(),
            });
        }
        current = parents.get(ancestor).copied().flatten();
    }

    Ok(())
}

/// Check a PUT against the stored record and both families involved.
///
/// `current_family` shares `current.main_order`; `target_family` shares
/// `update.main_order` (the same rows when the main order is unchanged).
pub fn check_update(
    current: &WorkOrder,
    update: &WorkOrderUpdate,
    current_family: &[WorkOrder],
    target_family: &[WorkOrder],
) -> Result<(), ReferenceError> {
    let renamed = current.order_no != update.order_no || current.main_order != update.main_order;
    if renamed {
        let referenced = current_family.iter().filter(|o| o.id != current.id).any(|o| {
            o.parent() == Some(current.order_no.as_str())
                || (current.is_main() && o.main_order == current.order_no)
        });
        if referenced {
            return Err(ReferenceError::StillReferenced(current.order_no.clone()));
        }
    }

    check_placement(
        &update.order_no,
        &update.main_order,
        update.parent_order.as_deref(),
        target_family,
        Some(current.id),
    )
}
