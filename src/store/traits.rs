use crate::logic::{FamilyResolution, HierarchyError};
use crate::model::{Id, NewWorkOrder, WorkOrder, WorkOrderUpdate};
use anyhow::Result;

/// Result of inserting a sub-order batch
#[derive(Debug, Clone, PartialEq)]
pub enum SplitOutcome {
    Created(Vec<WorkOrder>),
    /// Another request flipped the main order to `split` first
    AlreadySplit,
    /// The main order row was gone by the time the batch was written
    MainOrderMissing,
}

/// Result of a whole-record replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// No row matched the id and version
    NotApplied,
    /// Another row already holds the new `orderNo`
    OrderNoTaken,
}

/// Result of deleting an order together with everything hanging off it
#[derive(Debug, Clone)]
pub enum DeleteOutcome {
    /// The removed set, root first
    Deleted(FamilyResolution),
    Missing,
    /// The order moved to another family while the delete waited for it
    Changed,
    /// The family could not be resolved; nothing was removed
    Inconsistent(HierarchyError),
}

#[async_trait::async_trait]
pub trait WorkOrderStore: Send + Sync {
    /// List work orders, optionally restricted to one main order
    async fn list_work_orders(&self, main_order: Option<&str>) -> Result<Vec<WorkOrder>>;
    async fn get_work_order(&self, id: Id) -> Result<Option<WorkOrder>>;
    async fn work_order_exists(&self, id: Id) -> Result<bool>;
    async fn order_no_exists(&self, order_no: &str) -> Result<bool>;
    /// Orders whose `orderNo` equals their `mainOrder`
    async fn list_main_orders(&self, order_no: Option<&str>) -> Result<Vec<WorkOrder>>;
    /// Every order sharing `main_order`
    async fn list_family(&self, main_order: &str) -> Result<Vec<WorkOrder>>;
    async fn create_work_order(&self, order: NewWorkOrder) -> Result<WorkOrder>;
    /// Insert the batch and mark its main order `split` atomically
    async fn create_sub_orders(&self, main_order: &str, orders: Vec<NewWorkOrder>) -> Result<SplitOutcome>;
    /// Replace a record if its version still matches
    async fn update_work_order(&self, update: WorkOrderUpdate) -> Result<UpdateOutcome>;
    /// Resolve the order's family and remove the affected rows in one step.
    ///
    /// The family is read under the same lock or transaction as the delete,
    /// so a concurrent split cannot leave rows behind. When a sub-tree
    /// removal empties the family, the main order returns to `unsplit`.
    async fn delete_work_order(&self, id: Id) -> Result<DeleteOutcome>;
}

/// Trait for the routing lookup used when a work order is created
#[async_trait::async_trait]
pub trait RoutingStore: Send + Sync {
    /// Workshop code of the first process step of `flow_code`
    async fn entry_workshop(&self, flow_code: &str) -> Result<Option<String>>;
}

pub trait Store: WorkOrderStore + RoutingStore + Send + Sync {}
