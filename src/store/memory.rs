use anyhow::{bail, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::logic::{derive_workshop, releases_split, resolve_family};
use crate::model::{Id, NewWorkOrder, RoutingTable, SplitState, WorkOrder, WorkOrderUpdate};
use crate::store::traits::{
    DeleteOutcome, RoutingStore, SplitOutcome, Store, UpdateOutcome, WorkOrderStore,
};

#[derive(Debug, Default)]
struct MemoryState {
    /// Rows keyed by id; BTreeMap keeps listing order stable
    orders: BTreeMap<Id, WorkOrder>,
    next_id: Id,
}

impl MemoryState {
    fn insert(&mut self, order: NewWorkOrder) -> Result<WorkOrder> {
        if self.orders.values().any(|o| o.order_no == order.order_no) {
            bail!("order number '{}' already exists", order.order_no);
        }
        self.next_id += 1;
        let order = order.into_work_order(self.next_id, SplitState::Unsplit);
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    fn main_order_mut(&mut self, main_order: &str) -> Option<&mut WorkOrder> {
        self.orders
            .values_mut()
            .find(|o| o.order_no == main_order && o.is_main())
    }
}

/// Process-local store. All mutations are serialized behind one lock.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
    routing: RoutingTable,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routing(routing: RoutingTable) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            routing,
        }
    }

    /// Insert a row as-is (keeping its split state), bypassing validation.
    /// Used to load existing data.
    pub fn seed(&self, order: WorkOrder) {
        let mut state = self.state.write();
        state.next_id = state.next_id.max(order.id);
        state.orders.insert(order.id, order);
    }
}

#[async_trait::async_trait]
impl WorkOrderStore for InMemoryStore {
    async fn list_work_orders(&self, main_order: Option<&str>) -> Result<Vec<WorkOrder>> {
        let state = self.state.read();
        Ok(state
            .orders
            .values()
            .filter(|o| main_order.map_or(true, |m| o.main_order == m))
            .cloned()
            .collect())
    }

    async fn get_work_order(&self, id: Id) -> Result<Option<WorkOrder>> {
        Ok(self.state.read().orders.get(&id).cloned())
    }

    async fn work_order_exists(&self, id: Id) -> Result<bool> {
        Ok(self.state.read().orders.contains_key(&id))
    }

    async fn order_no_exists(&self, order_no: &str) -> Result<bool> {
        Ok(self
            .state
            .read()
            .orders
            .values()
            .any(|o| o.order_no == order_no))
    }

    async fn list_main_orders(&self, order_no: Option<&str>) -> Result<Vec<WorkOrder>> {
        let state = self.state.read();
        Ok(state
            .orders
            .values()
            .filter(|o| o.is_main() && order_no.map_or(true, |n| o.order_no == n))
            .cloned()
            .collect())
    }

    async fn list_family(&self, main_order: &str) -> Result<Vec<WorkOrder>> {
        self.list_work_orders(Some(main_order)).await
    }

    async fn create_work_order(&self, order: NewWorkOrder) -> Result<WorkOrder> {
        self.state.write().insert(order)
    }

    async fn create_sub_orders(&self, main_order: &str, orders: Vec<NewWorkOrder>) -> Result<SplitOutcome> {
        let mut state = self.state.write();

        match state.main_order_mut(main_order) {
            Some(main) if main.split_state == SplitState::Unsplit => {}
            Some(_) => return Ok(SplitOutcome::AlreadySplit),
            None => return Ok(SplitOutcome::MainOrderMissing),
        }

        // check every row before inserting any, so a failure leaves no partial batch
        for order in &orders {
            if state.orders.values().any(|o| o.order_no == order.order_no) {
                bail!("order number '{}' already exists", order.order_no);
            }
        }

        let mut created = Vec::with_capacity(orders.len());
        for order in orders {
            created.push(state.insert(order)?);
        }

        if let Some(main) = state.main_order_mut(main_order) {
            main.split_state = SplitState::Split;
            main.version += 1;
            main.updated_at = chrono::Utc::now();
        }

        Ok(SplitOutcome::Created(created))
    }

    async fn update_work_order(&self, update: WorkOrderUpdate) -> Result<UpdateOutcome> {
        let mut state = self.state.write();
        if state
            .orders
            .values()
            .any(|o| o.id != update.id && o.order_no == update.order_no)
        {
            return Ok(UpdateOutcome::OrderNoTaken);
        }

        match state.orders.get_mut(&update.id) {
            Some(order) if order.version == update.version => {
                update.apply_to(order);
                Ok(UpdateOutcome::Updated)
            }
            _ => Ok(UpdateOutcome::NotApplied),
        }
    }

    async fn delete_work_order(&self, id: Id) -> Result<DeleteOutcome> {
        let mut state = self.state.write();
        let Some(order) = state.orders.get(&id).cloned() else {
            return Ok(DeleteOutcome::Missing);
        };

        let family: Vec<WorkOrder> = state
            .orders
            .values()
            .filter(|o| o.main_order == order.main_order)
            .cloned()
            .collect();
        let resolution = match resolve_family(&order.order_no, &family) {
            Ok(resolution) => resolution,
            Err(e) => return Ok(DeleteOutcome::Inconsistent(e)),
        };

        for removed in &resolution.orders {
            state.orders.remove(&removed.id);
        }

        if !order.is_main() && releases_split(&family, &resolution.orders) {
            if let Some(main) = state.main_order_mut(&order.main_order) {
                main.split_state = SplitState::Unsplit;
                main.version += 1;
                main.updated_at = chrono::Utc::now();
            }
        }

        Ok(DeleteOutcome::Deleted(resolution))
    }
}

#[async_trait::async_trait]
impl RoutingStore for InMemoryStore {
    async fn entry_workshop(&self, flow_code: &str) -> Result<Option<String>> {
        Ok(derive_workshop(Some(flow_code), &self.routing))
    }
}

impl Store for InMemoryStore {}
