use crate::model::{non_blank, Id, OrderNo, SplitState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrder {
    pub id: Id,
    pub order_no: OrderNo,
    /// `orderNo` of the top-level order; equal to `order_no` on a main order
    pub main_order: OrderNo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_order: Option<OrderNo>,
    #[serde(default)]
    pub flow_code: Option<String>,
    #[serde(default)]
    pub workshop_code: Option<String>,
    #[serde(default)]
    pub split_state: SplitState,
    /// Row version for optimistic concurrency
    #[serde(default)]
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkOrder {
    pub fn is_main(&self) -> bool {
        self.order_no == self.main_order
    }

    /// Parent reference with empty strings normalized away
    pub fn parent(&self) -> Option<&str> {
        non_blank(self.parent_order.as_deref())
    }
}

/// Input model for creating a work order (single or as part of a split batch)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkOrder {
    pub order_no: OrderNo,
    #[serde(default)]
    pub main_order: OrderNo,
    #[serde(default)]
    pub parent_order: Option<OrderNo>,
    #[serde(default)]
    pub flow_code: Option<String>,
    #[serde(default)]
    pub workshop_code: Option<String>,
}

impl NewWorkOrder {
    pub fn validate(&self) -> Result<(), String> {
        if self.order_no.trim().is_empty() {
            return Err("orderNo must not be empty".to_string());
        }
        if non_blank(self.parent_order.as_deref()) == Some(self.order_no.trim()) {
            return Err(format!("work order '{}' cannot be its own parent", self.order_no));
        }
        Ok(())
    }

    /// An empty `mainOrder` on a standalone create makes the order its own main order
    pub fn normalized_as_main(mut self) -> Self {
        if self.main_order.trim().is_empty() {
            self.main_order = self.order_no.clone();
        }
        self.parent_order = non_blank(self.parent_order.as_deref()).map(str::to_string);
        self
    }

    /// Materialize with store-assigned fields
    pub fn into_work_order(self, id: Id, split_state: SplitState) -> WorkOrder {
        let now = Utc::now();
        WorkOrder {
            id,
            parent_order: non_blank(self.parent_order.as_deref()).map(str::to_string),
            order_no: self.order_no,
            main_order: self.main_order,
            flow_code: self.flow_code,
            workshop_code: self.workshop_code,
            split_state,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Whole-record replacement payload for PUT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderUpdate {
    pub id: Id,
    pub order_no: OrderNo,
    pub main_order: OrderNo,
    #[serde(default)]
    pub parent_order: Option<OrderNo>,
    #[serde(default)]
    pub flow_code: Option<String>,
    #[serde(default)]
    pub workshop_code: Option<String>,
    /// The version the client last read
    pub version: i32,
}

impl WorkOrderUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if self.order_no.trim().is_empty() {
            return Err("orderNo must not be empty".to_string());
        }
        if self.main_order.trim().is_empty() {
            return Err("mainOrder must not be empty".to_string());
        }
        if non_blank(self.parent_order.as_deref()) == Some(self.order_no.trim()) {
            return Err(format!("work order '{}' cannot be its own parent", self.order_no));
        }
        Ok(())
    }

    /// Apply onto a stored record, bumping its version
    pub fn apply_to(self, order: &mut WorkOrder) {
        order.order_no = self.order_no;
        order.main_order = self.main_order;
        order.parent_order = non_blank(self.parent_order.as_deref()).map(str::to_string);
        order.flow_code = self.flow_code;
        order.workshop_code = self.workshop_code;
        order.version += 1;
        order.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_work_order_json_uses_camel_case() {
        let order = NewWorkOrder {
            order_no: "WO-1".to_string(),
            main_order: String::new(),
            parent_order: Some(String::new()),
            flow_code: Some("F01".to_string()),
            workshop_code: None,
        }
        .normalized_as_main()
        .into_work_order(7, SplitState::Unsplit);

        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["orderNo"], json!("WO-1"));
        assert_eq!(value["mainOrder"], json!("WO-1"));
        assert_eq!(value["splitState"], json!("unsplit"));
        assert!(value.get("parentOrder").is_none());
        assert!(order.is_main());
    }

    #[test]
    fn test_new_work_order_rejects_self_parent() {
        let order: NewWorkOrder = serde_json::from_value(json!({
            "orderNo": "WO-2",
            "mainOrder": "WO-1",
            "parentOrder": "WO-2"
        }))
        .unwrap();
        assert!(order.validate().is_err());
    }

    #[test]
    fn test_update_bumps_version() {
        let mut order = NewWorkOrder {
            order_no: "WO-1".to_string(),
            main_order: "WO-1".to_string(),
            parent_order: None,
            flow_code: None,
            workshop_code: None,
        }
        .into_work_order(1, SplitState::Split);

        WorkOrderUpdate {
            id: 1,
            order_no: "WO-1".to_string(),
            main_order: "WO-1".to_string(),
            parent_order: None,
            flow_code: Some("F02".to_string()),
            workshop_code: Some("WS-A".to_string()),
            version: 0,
        }
        .apply_to(&mut order);

        assert_eq!(order.version, 1);
        assert_eq!(order.flow_code.as_deref(), Some("F02"));
        // split state is owned by the split/delete operations, not by PUT
        assert_eq!(order.split_state, SplitState::Split);
    }
}
