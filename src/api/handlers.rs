use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::logic::{
    check_placement, check_update, resolve_family, validate_split, FamilyResolution, HierarchyError,
    ReferenceError, SplitRejection,
};
use crate::model::{non_blank, Id, NewWorkOrder, WorkOrder, WorkOrderUpdate};
use crate::store::traits::{DeleteOutcome, SplitOutcome, Store, UpdateOutcome};

pub type AppState<S> = Arc<S>;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderListQuery {
    pub main_order: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderNoQuery {
    pub order_no: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(ErrorResponse::new(message)))
}

fn internal_error(e: anyhow::Error) -> ApiError {
    log::error!("store failure: {:#}", e);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
}

fn work_order_not_found(id: Id) -> ApiError {
    api_error(StatusCode::NOT_FOUND, &format!("Work order {} not found", id))
}

fn work_order_modified(id: Id) -> ApiError {
    log::warn!("rejected stale write to work order {}", id);
    api_error(
        StatusCode::CONFLICT,
        &format!("Work order {} was modified by another request", id),
    )
}

fn order_no_taken(order_no: &str) -> ApiError {
    api_error(
        StatusCode::CONFLICT,
        &format!("Order number '{}' already exists", order_no),
    )
}

fn bad_reference(e: ReferenceError) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, &e.to_string())
}

fn inconsistent_family(main_order: &str, e: HierarchyError) -> ApiError {
    log::error!("work order family '{}' is inconsistent: {}", main_order, e);
    api_error(
        StatusCode::CONFLICT,
        &format!("Work order family is inconsistent: {}", e),
    )
}

/// Unwrap a JSON body, rendering malformed payloads as 400
fn json_body<T>(payload: Result<RequestJson<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|RequestJson(body)| body)
        .map_err(|rejection| api_error(StatusCode::BAD_REQUEST, &rejection.body_text()))
}

// Work order queries
pub async fn list_work_orders<S: Store>(
    State(store): State<AppState<S>>,
    Query(query): Query<WorkOrderListQuery>,
) -> Result<Json<Vec<WorkOrder>>, ApiError> {
    let main_order = non_blank(query.main_order.as_deref());
    let orders = store
        .list_work_orders(main_order)
        .await
        .map_err(internal_error)?;
    Ok(Json(orders))
}

pub async fn get_work_order<S: Store>(
    State(store): State<AppState<S>>,
    Path(id): Path<Id>,
) -> Result<Json<WorkOrder>, ApiError> {
    match store.get_work_order(id).await {
        Ok(Some(order)) => Ok(Json(order)),
        Ok(None) => Err(work_order_not_found(id)),
        Err(e) => Err(internal_error(e)),
    }
}

pub async fn list_main_orders<S: Store>(
    State(store): State<AppState<S>>,
    Query(query): Query<OrderNoQuery>,
) -> Result<Json<Vec<WorkOrder>>, ApiError> {
    let order_no = non_blank(query.order_no.as_deref());
    let orders = store
        .list_main_orders(order_no)
        .await
        .map_err(internal_error)?;
    Ok(Json(orders))
}

/// `true` when the order number is non-blank and not yet taken
pub async fn validate_order_no<S: Store>(
    State(store): State<AppState<S>>,
    Query(query): Query<OrderNoQuery>,
) -> Result<Json<bool>, ApiError> {
    let Some(order_no) = non_blank(query.order_no.as_deref()) else {
        return Ok(Json(false));
    };
    let taken = store.order_no_exists(order_no).await.map_err(internal_error)?;
    Ok(Json(!taken))
}

/// Preview of the orders a DELETE would remove, with integrity warnings
pub async fn get_work_order_family<S: Store>(
    State(store): State<AppState<S>>,
    Path(id): Path<Id>,
) -> Result<Json<FamilyResolution>, ApiError> {
    let order = match store.get_work_order(id).await {
        Ok(Some(order)) => order,
        Ok(None) => return Err(work_order_not_found(id)),
        Err(e) => return Err(internal_error(e)),
    };

    let family = store
        .list_family(&order.main_order)
        .await
        .map_err(internal_error)?;
    let resolution =
        resolve_family(&order.order_no, &family).map_err(|e| inconsistent_family(&order.main_order, e))?;

    for warning in &resolution.warnings {
        log::warn!("work order family '{}': {:?}", order.main_order, warning);
    }

    Ok(Json(resolution))
}

// Work order mutations
pub async fn update_work_order<S: Store>(
    State(store): State<AppState<S>>,
    Path(id): Path<Id>,
    payload: Result<RequestJson<WorkOrderUpdate>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let update = json_body(payload)?;
    update
        .validate()
        .map_err(|msg| api_error(StatusCode::BAD_REQUEST, &msg))?;

    if update.id != id {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            &format!("Path id {} does not match body id {}", id, update.id),
        ));
    }

    let current = match store.get_work_order(id).await {
        Ok(Some(order)) => order,
        Ok(None) => return Err(work_order_not_found(id)),
        Err(e) => return Err(internal_error(e)),
    };
    if current.version != update.version {
        return Err(work_order_modified(id));
    }

    let current_family = store
        .list_family(&current.main_order)
        .await
        .map_err(internal_error)?;
    let moved_family;
    let target_family = if update.main_order == current.main_order {
        &current_family
    } else {
        moved_family = store
            .list_family(&update.main_order)
            .await
            .map_err(internal_error)?;
        &moved_family
    };
    check_update(&current, &update, &current_family, target_family).map_err(bad_reference)?;

    let order_no = update.order_no.clone();
    if order_no != current.order_no && store.order_no_exists(&order_no).await.map_err(internal_error)? {
        return Err(order_no_taken(&order_no));
    }

    match store.update_work_order(update).await.map_err(internal_error)? {
        UpdateOutcome::Updated => Ok(StatusCode::NO_CONTENT),
        UpdateOutcome::OrderNoTaken => Err(order_no_taken(&order_no)),
        // Nothing matched: either gone or changed since it was read above
        UpdateOutcome::NotApplied => match store.work_order_exists(id).await {
            Ok(false) => Err(work_order_not_found(id)),
            Ok(true) => Err(work_order_modified(id)),
            Err(e) => Err(internal_error(e)),
        },
    }
}

pub async fn create_work_order<S: Store>(
    State(store): State<AppState<S>>,
    payload: Result<RequestJson<NewWorkOrder>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let new_order = json_body(payload)?;
    new_order
        .validate()
        .map_err(|msg| api_error(StatusCode::BAD_REQUEST, &msg))?;
    let mut new_order = new_order.normalized_as_main();

    if store
        .order_no_exists(&new_order.order_no)
        .await
        .map_err(internal_error)?
    {
        return Err(order_no_taken(&new_order.order_no));
    }

    let family = if new_order.main_order == new_order.order_no {
        Vec::new()
    } else {
        store
            .list_family(&new_order.main_order)
            .await
            .map_err(internal_error)?
    };
    check_placement(
        &new_order.order_no,
        &new_order.main_order,
        new_order.parent_order.as_deref(),
        &family,
        None,
    )
    .map_err(bad_reference)?;

    new_order.workshop_code = match non_blank(new_order.flow_code.as_deref()) {
        Some(flow_code) => store
            .entry_workshop(flow_code)
            .await
            .map_err(internal_error)?,
        None => None,
    };
    if new_order.workshop_code.is_none() {
        log::debug!(
            "no entry workshop for flow {:?}; leaving work order '{}' unassigned",
            new_order.flow_code,
            new_order.order_no
        );
    }

    let order = store
        .create_work_order(new_order)
        .await
        .map_err(internal_error)?;
    log::info!("created work order '{}' (id {})", order.order_no, order.id);

    let location = format!("/workorders/{}", order.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(order),
    ))
}

pub async fn create_sub_orders<S: Store>(
    State(store): State<AppState<S>>,
    payload: Result<RequestJson<Vec<NewWorkOrder>>, JsonRejection>,
) -> Result<Json<Vec<WorkOrder>>, ApiError> {
    let batch = json_body(payload)?;
    let rejected = |rejection: SplitRejection| api_error(StatusCode::BAD_REQUEST, &rejection.to_string());

    let Some(first) = batch.first() else {
        return Err(rejected(SplitRejection::EmptyBatch));
    };
    let main_order = first.main_order.clone();

    for order in &batch {
        order
            .validate()
            .map_err(|msg| api_error(StatusCode::BAD_REQUEST, &msg))?;
    }

    let existing = store
        .list_family(&main_order)
        .await
        .map_err(internal_error)?;
    validate_split(&batch, &existing).map_err(rejected)?;

    // validate_split only sees this family; order numbers are unique store-wide
    for order in &batch {
        if store
            .order_no_exists(&order.order_no)
            .await
            .map_err(internal_error)?
        {
            return Err(rejected(SplitRejection::DuplicateOrderNo(order.order_no.clone())));
        }
    }

    let batch: Vec<NewWorkOrder> = batch
        .into_iter()
        .map(|mut order| {
            order.parent_order = non_blank(order.parent_order.as_deref()).map(str::to_string);
            order
        })
        .collect();

    let outcome = store
        .create_sub_orders(&main_order, batch)
        .await
        .map_err(internal_error)?;
    match outcome {
        SplitOutcome::Created(orders) => {
            log::info!("split main order '{}' into {} sub-orders", main_order, orders.len());
            Ok(Json(orders))
        }
        SplitOutcome::AlreadySplit => {
            log::warn!("concurrent split of main order '{}' lost the race", main_order);
            Err(rejected(SplitRejection::AlreadySplit))
        }
        SplitOutcome::MainOrderMissing => {
            log::warn!("main order '{}' was deleted before its split was saved", main_order);
            Err(rejected(SplitRejection::MainOrderMissing(main_order)))
        }
    }
}

/// Delete an order and everything that hangs off it.
///
/// A main order takes its whole family with it; a sub-order takes only
/// its own descendants.
pub async fn delete_work_order<S: Store>(
    State(store): State<AppState<S>>,
    Path(id): Path<Id>,
) -> Result<Json<WorkOrder>, ApiError> {
    match store.delete_work_order(id).await.map_err(internal_error)? {
        DeleteOutcome::Deleted(resolution) => {
            let order = resolution.root;
            for warning in &resolution.warnings {
                log::warn!("work order family '{}': {:?}", order.main_order, warning);
            }
            log::info!(
                "deleted work order '{}' and {} related rows",
                order.order_no,
                resolution.orders.len().saturating_sub(1)
            );
            Ok(Json(order))
        }
        DeleteOutcome::Missing => Err(work_order_not_found(id)),
        DeleteOutcome::Changed => Err(work_order_modified(id)),
        DeleteOutcome::Inconsistent(e) => {
            log::error!("refusing to delete work order {}: {}", id, e);
            Err(api_error(
                StatusCode::CONFLICT,
                &format!("Work order family is inconsistent: {}", e),
            ))
        }
    }
}
