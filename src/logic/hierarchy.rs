//! Work-order family resolution.
//!
//! A family is every order sharing one `mainOrder`. Inside a family the
//! `parentOrder` references form a forest. Deleting an order removes:
//!
//! - the whole family, when the order is the main order itself;
//! - otherwise the order and all of its transitive descendants.
//!
//! The affected set is computed up front so the store can remove it in a
//! single operation and never leaves a dangling `parentOrder`.

use itertools::Itertools;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::model::WorkOrder;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    #[error("work order '{0}' is not part of the family")]
    RootNotFound(String),
    #[error("order number '{order_no}' appears {count} times in family '{main_order}'")]
    DuplicateOrderNo {
        main_order: String,
        order_no: String,
        count: usize,
    },
    #[error("work order '{order_no}' belongs to main order '{actual}', not '{expected}'")]
    ForeignOrder {
        order_no: String,
        expected: String,
        actual: String,
    },
    #[error("parent references under '{root}' form a cycle at '{order_no}'")]
    CycleDetected { root: String, order_no: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IntegrityWarning {
    /// `parentOrder` names an order that does not exist in the family
    #[serde(rename_all = "camelCase")]
    OrphanedOrder {
        order_no: String,
        missing_parent: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct FamilyResolution {
    pub root: WorkOrder,
    /// Root first, then descendants in depth-first order
    pub orders: Vec<WorkOrder>,
    pub warnings: Vec<IntegrityWarning>,
}

impl FamilyResolution {
    pub fn ids(&self) -> Vec<crate::model::Id> {
        self.orders.iter().map(|o| o.id).collect()
    }

    pub fn contains(&self, order_no: &str) -> bool {
        self.orders.iter().any(|o| o.order_no == order_no)
    }
}

/// Resolve the set of orders affected by removing `root_order_no`.
///
/// `family` must be every order sharing the root's `mainOrder`.
pub fn resolve_family(
    root_order_no: &str,
    family: &[WorkOrder],
) -> Result<FamilyResolution, HierarchyError> {
    let root = family
        .iter()
        .find(|o| o.order_no == root_order_no)
        .ok_or_else(|| HierarchyError::RootNotFound(root_order_no.to_string()))?;
    let main_order = root.main_order.as_str();

    if let Some(foreign) = family.iter().find(|o| o.main_order != main_order) {
        return Err(HierarchyError::ForeignOrder {
            order_no: foreign.order_no.clone(),
            expected: main_order.to_string(),
            actual: foreign.main_order.clone(),
        });
    }

    let counts = family.iter().counts_by(|o| o.order_no.as_str());
    if let Some((order_no, count)) = counts
        .iter()
        .filter(|(_, count)| **count > 1)
        .sorted()
        .next()
    {
        return Err(HierarchyError::DuplicateOrderNo {
            main_order: main_order.to_string(),
            order_no: order_no.to_string(),
            count: *count,
        });
    }

    let warnings = find_orphans(family, &counts);

    if root.is_main() {
        return Ok(FamilyResolution {
            root: root.clone(),
            orders: family.to_vec(),
            warnings,
        });
    }

    let children = index_children(family);
    let mut visited: HashSet<&str> = HashSet::new();
    let mut orders = Vec::new();
    let mut stack = vec![root];

    while let Some(current) = stack.pop() {
        if !visited.insert(current.order_no.as_str()) {
            return Err(HierarchyError::CycleDetected {
                root: root_order_no.to_string(),
                order_no: current.order_no.clone(),
            });
        }
        orders.push(current.clone());

        if let Some(kids) = children.get(current.order_no.as_str()) {
            // reversed so the first child is visited first
            stack.extend(kids.iter().rev());
        }
    }

    Ok(FamilyResolution {
        root: root.clone(),
        orders,
        warnings,
    })
}

/// Map from parent `orderNo` to its direct children, in collection order
fn index_children(family: &[WorkOrder]) -> HashMap<&str, Vec<&WorkOrder>> {
    let mut children: HashMap<&str, Vec<&WorkOrder>> = HashMap::new();
    for order in family {
        if let Some(parent) = order.parent() {
            children.entry(parent).or_default().push(order);
        }
    }
    children
}

fn find_orphans(family: &[WorkOrder], known: &HashMap<&str, usize>) -> Vec<IntegrityWarning> {
    family
        .iter()
        .filter_map(|o| {
            let parent = o.parent()?;
            (!known.contains_key(parent)).then(|| IntegrityWarning::OrphanedOrder {
                order_no: o.order_no.clone(),
                missing_parent: parent.to_string(),
            })
        })
        .collect()
}
