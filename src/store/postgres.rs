use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Row,
};

use crate::logic::{releases_split, resolve_family};
use crate::model::{Id, NewWorkOrder, SplitState, WorkOrder, WorkOrderUpdate};
use crate::store::traits::{
    DeleteOutcome, RoutingStore, SplitOutcome, Store, UpdateOutcome, WorkOrderStore,
};

const WORK_ORDER_COLUMNS: &str = "id, order_no, main_order, parent_order, flow_code, workshop_code, \
     split_state, version, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }
}

fn work_order_from_row(row: &PgRow) -> Result<WorkOrder> {
    let split_state: String = row.try_get("split_state")?;
    Ok(WorkOrder {
        id: row.try_get("id")?,
        order_no: row.try_get("order_no")?,
        main_order: row.try_get("main_order")?,
        parent_order: row.try_get("parent_order")?,
        flow_code: row.try_get("flow_code")?,
        workshop_code: row.try_get("workshop_code")?,
        split_state: SplitState::from_db(&split_state),
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn work_orders_from_rows(rows: Vec<PgRow>) -> Result<Vec<WorkOrder>> {
    rows.iter().map(work_order_from_row).collect()
}

async fn insert_work_order<'e, E>(executor: E, order: &NewWorkOrder) -> Result<WorkOrder>
where
    E: sqlx::PgExecutor<'e>,
{
    let sql = format!(
        r#"
        INSERT INTO p_work_order (order_no, main_order, parent_order, flow_code, workshop_code,
                                  split_state, version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, 0, NOW(), NOW())
        RETURNING {WORK_ORDER_COLUMNS}
        "#
    );
    let row = sqlx::query(&sql)
        .bind(&order.order_no)
        .bind(&order.main_order)
        .bind(&order.parent_order)
        .bind(&order.flow_code)
        .bind(&order.workshop_code)
        .bind(SplitState::Unsplit.as_str())
        .fetch_one(executor)
        .await
        .with_context(|| format!("Failed to insert work order '{}'", order.order_no))?;

    work_order_from_row(&row)
}

#[async_trait::async_trait]
impl WorkOrderStore for PostgresStore {
    async fn list_work_orders(&self, main_order: Option<&str>) -> Result<Vec<WorkOrder>> {
        let sql = format!(
            r#"
            SELECT {WORK_ORDER_COLUMNS} FROM p_work_order
            WHERE ($1::TEXT IS NULL OR main_order = $1)
            ORDER BY id
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(main_order)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list work orders")?;

        work_orders_from_rows(rows)
    }

    async fn get_work_order(&self, id: Id) -> Result<Option<WorkOrder>> {
        let sql = format!("SELECT {WORK_ORDER_COLUMNS} FROM p_work_order WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch work order")?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(work_order_from_row(&row)?))
    }

    async fn work_order_exists(&self, id: Id) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM p_work_order WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check work order existence")?;

        Ok(exists)
    }

    async fn order_no_exists(&self, order_no: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM p_work_order WHERE order_no = $1)")
                .bind(order_no)
                .fetch_one(&self.pool)
                .await
                .context("Failed to check order number")?;

        Ok(exists)
    }

    async fn list_main_orders(&self, order_no: Option<&str>) -> Result<Vec<WorkOrder>> {
        let sql = format!(
            r#"
            SELECT {WORK_ORDER_COLUMNS} FROM p_work_order
            WHERE order_no = main_order AND ($1::TEXT IS NULL OR order_no = $1)
            ORDER BY id
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(order_no)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list main orders")?;

        work_orders_from_rows(rows)
    }

    async fn list_family(&self, main_order: &str) -> Result<Vec<WorkOrder>> {
        self.list_work_orders(Some(main_order)).await
    }

    async fn create_work_order(&self, order: NewWorkOrder) -> Result<WorkOrder> {
        insert_work_order(&self.pool, &order).await
    }

    async fn create_sub_orders(&self, main_order: &str, orders: Vec<NewWorkOrder>) -> Result<SplitOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin split transaction")?;

        // The row lock serializes splits and deletes of one family
        let split_state: Option<String> = sqlx::query_scalar(
            r#"
            SELECT split_state FROM p_work_order
            WHERE order_no = $1 AND main_order = order_no
            FOR UPDATE
            "#,
        )
        .bind(main_order)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to lock main order")?;

        let refused = match split_state.as_deref().map(SplitState::from_db) {
            None => Some(SplitOutcome::MainOrderMissing),
            Some(SplitState::Split) => Some(SplitOutcome::AlreadySplit),
            Some(SplitState::Unsplit) => None,
        };
        if let Some(outcome) = refused {
            tx.rollback().await.context("Failed to roll back split")?;
            return Ok(outcome);
        }

        sqlx::query(
            r#"
            UPDATE p_work_order
            SET split_state = $2, version = version + 1, updated_at = NOW()
            WHERE order_no = $1 AND main_order = order_no
            "#,
        )
        .bind(main_order)
        .bind(SplitState::Split.as_str())
        .execute(&mut *tx)
        .await
        .context("Failed to mark main order as split")?;

        let mut created = Vec::with_capacity(orders.len());
        for order in &orders {
            created.push(insert_work_order(&mut *tx, order).await?);
        }

        tx.commit().await.context("Failed to commit split")?;
        Ok(SplitOutcome::Created(created))
    }

    async fn update_work_order(&self, update: WorkOrderUpdate) -> Result<UpdateOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE p_work_order
            SET order_no = $2, main_order = $3, parent_order = NULLIF($4, ''),
                flow_code = $5, workshop_code = $6,
                version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $7
            "#,
        )
        .bind(update.id)
        .bind(&update.order_no)
        .bind(&update.main_order)
        .bind(&update.parent_order)
        .bind(&update.flow_code)
        .bind(&update.workshop_code)
        .bind(update.version)
        .execute(&self.pool)
        .await;

        match result {
            Ok(result) if result.rows_affected() > 0 => Ok(UpdateOutcome::Updated),
            Ok(_) => Ok(UpdateOutcome::NotApplied),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(UpdateOutcome::OrderNoTaken),
            Err(e) => Err(e).context("Failed to update work order"),
        }
    }

    async fn delete_work_order(&self, id: Id) -> Result<DeleteOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin delete transaction")?;

        let sql = format!("SELECT {WORK_ORDER_COLUMNS} FROM p_work_order WHERE id = $1");
        let Some(row) = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to fetch work order")?
        else {
            tx.rollback().await.context("Failed to roll back delete")?;
            return Ok(DeleteOutcome::Missing);
        };
        let target = work_order_from_row(&row)?;

        // Main row first, same as a split, so the two never deadlock
        sqlx::query("SELECT id FROM p_work_order WHERE order_no = $1 AND main_order = order_no FOR UPDATE")
            .bind(&target.main_order)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to lock main order")?;

        let sql = format!(
            r#"
            SELECT {WORK_ORDER_COLUMNS} FROM p_work_order
            WHERE main_order = $1
            ORDER BY id
            FOR UPDATE
            "#
        );
        let family = work_orders_from_rows(
            sqlx::query(&sql)
                .bind(&target.main_order)
                .fetch_all(&mut *tx)
                .await
                .context("Failed to lock work order family")?,
        )?;

        let Some(order) = family.iter().find(|o| o.id == id).cloned() else {
            tx.rollback().await.context("Failed to roll back delete")?;
            return Ok(DeleteOutcome::Changed);
        };

        let resolution = match resolve_family(&order.order_no, &family) {
            Ok(resolution) => resolution,
            Err(e) => {
                tx.rollback().await.context("Failed to roll back delete")?;
                return Ok(DeleteOutcome::Inconsistent(e));
            }
        };

        sqlx::query("DELETE FROM p_work_order WHERE id = ANY($1)")
            .bind(resolution.ids())
            .execute(&mut *tx)
            .await
            .context("Failed to delete work orders")?;

        if !order.is_main() && releases_split(&family, &resolution.orders) {
            sqlx::query(
                r#"
                UPDATE p_work_order
                SET split_state = $2, version = version + 1, updated_at = NOW()
                WHERE order_no = $1 AND main_order = order_no
                "#,
            )
            .bind(&order.main_order)
            .bind(SplitState::Unsplit.as_str())
            .execute(&mut *tx)
            .await
            .context("Failed to release split state")?;
        }

        tx.commit().await.context("Failed to commit delete")?;
        Ok(DeleteOutcome::Deleted(resolution))
    }
}

#[async_trait::async_trait]
impl RoutingStore for PostgresStore {
    async fn entry_workshop(&self, flow_code: &str) -> Result<Option<String>> {
        // No ORDER BY: ties resolve to whatever row the planner yields first
        let ws_code: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT w.ws_code
            FROM b_work_shop w
            JOIN b_work_group g ON w.wsid = g.wsid
            JOIN b_process_flow_detail f ON g.group_code = f.process_from_group
            WHERE f.flow_code = $1 AND f.idx = 1
            LIMIT 1
            "#,
        )
        .bind(flow_code)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up entry workshop")?;

        Ok(ws_code.flatten())
    }
}

impl Store for PostgresStore {}
