//! Budget queries, including the lifecycle transitions.
//!
//! Transitions use conditional `UPDATE ... WHERE status = ...` inside a
//! transaction, so a concurrent transition loses cleanly and the session
//! cascade stays atomic with the status flip.

use chrono::{DateTime, Utc};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::{PgPool, PgTransaction};
use uuid::Uuid;

use dentora_core::{
    Budget, BudgetItem, BudgetStatus, CoreError, generate_id, now_utc, recompute_totals,
};
use dentora_storage::StorageError;
use dentora_storage::types::{
    BudgetFilter, BudgetUpdate, BudgetWithItems, NewBudget, NewBudgetItem, Page, Paged,
};

use super::{chrono_to_time, db_err, time_to_chrono};
use crate::error::is_foreign_key_violation;

type BudgetRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    String,
    Option<String>,
    i64,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
);

type ItemRow = (Uuid, Uuid, Option<Uuid>, String, i32, i64, i64, i32);

const BUDGET_COLUMNS: &str = "id, patient_id, doctor_id, status, title, notes, total_cents, \
     created_at, updated_at, activated_at, completed_at";

const ITEM_COLUMNS: &str =
    "id, budget_id, service_id, description, quantity, unit_price_cents, line_total_cents, position";

fn budget_from_row(row: BudgetRow) -> Result<Budget, StorageError> {
    let status: BudgetStatus = row
        .3
        .parse()
        .map_err(|e: CoreError| StorageError::internal(format!("stored budget status: {e}")))?;
    Ok(Budget {
        id: row.0,
        patient_id: row.1,
        doctor_id: row.2,
        status,
        title: row.4,
        notes: row.5,
        total_cents: row.6,
        created_at: chrono_to_time(row.7),
        updated_at: chrono_to_time(row.8),
        activated_at: row.9.map(chrono_to_time),
        completed_at: row.10.map(chrono_to_time),
    })
}

fn item_from_row(row: ItemRow) -> BudgetItem {
    BudgetItem {
        id: row.0,
        budget_id: row.1,
        service_id: row.2,
        description: row.3,
        quantity: row.4.max(0) as u32,
        unit_price_cents: row.5,
        line_total_cents: row.6,
        position: row.7,
    }
}

/// Builds domain items (with fresh ids and recomputed totals) for a budget.
fn build_items(budget_id: Uuid, items: Vec<NewBudgetItem>) -> (Vec<BudgetItem>, i64) {
    let mut items: Vec<BudgetItem> = items
        .into_iter()
        .enumerate()
        .map(|(position, item)| BudgetItem {
            id: generate_id(),
            budget_id,
            service_id: item.service_id,
            description: item.description,
            quantity: item.quantity,
            unit_price_cents: item.unit_price_cents,
            line_total_cents: 0,
            position: position as i32,
        })
        .collect();
    let total = recompute_totals(&mut items);
    (items, total)
}

async fn insert_items(
    tx: &mut PgTransaction<'_>,
    items: &[BudgetItem],
) -> Result<(), StorageError> {
    for item in items {
        query(
            "INSERT INTO budget_items \
             (id, budget_id, service_id, description, quantity, unit_price_cents, line_total_cents, position) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(item.id)
        .bind(item.budget_id)
        .bind(item.service_id)
        .bind(&item.description)
        .bind(item.quantity as i32)
        .bind(item.unit_price_cents)
        .bind(item.line_total_cents)
        .bind(item.position)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StorageError::invalid_entity("service_id does not reference a known service")
            } else {
                db_err("insert budget item", e)
            }
        })?;
    }
    Ok(())
}

async fn fetch_items(pool: &PgPool, budget_id: Uuid) -> Result<Vec<BudgetItem>, StorageError> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM budget_items WHERE budget_id = $1 ORDER BY position"
    );
    let rows: Vec<ItemRow> = query_as(&sql)
        .bind(budget_id)
        .fetch_all(pool)
        .await
        .map_err(|e| db_err("list budget items", e))?;
    Ok(rows.into_iter().map(item_from_row).collect())
}

async fn fetch_items_tx(
    tx: &mut PgTransaction<'_>,
    budget_id: Uuid,
) -> Result<Vec<BudgetItem>, StorageError> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM budget_items WHERE budget_id = $1 ORDER BY position"
    );
    let rows: Vec<ItemRow> = query_as(&sql)
        .bind(budget_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| db_err("list budget items", e))?;
    Ok(rows.into_iter().map(item_from_row).collect())
}

/// Resolves why a conditional transition update matched no row: the budget
/// either does not exist or sits in the wrong state.
async fn transition_error(
    tx: &mut PgTransaction<'_>,
    id: Uuid,
    action: &str,
) -> StorageError {
    let status: Result<Option<String>, _> =
        query_scalar("SELECT status FROM budgets WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await;
    match status {
        Ok(Some(status)) => CoreError::invalid_transition("budget", action, status).into(),
        Ok(None) => StorageError::not_found("budget", id),
        Err(e) => db_err("read budget status", e),
    }
}

pub async fn create(pool: &PgPool, new: NewBudget) -> Result<BudgetWithItems, StorageError> {
    let budget_id = generate_id();
    let (items, total_cents) = build_items(budget_id, new.items);
    let now = time_to_chrono(now_utc());

    let mut tx = pool.begin().await.map_err(|e| db_err("begin", e))?;
    let sql = format!(
        "INSERT INTO budgets \
         (id, patient_id, doctor_id, status, title, notes, total_cents, created_at, updated_at) \
         VALUES ($1, $2, $3, 'draft', $4, $5, $6, $7, $7) \
         RETURNING {BUDGET_COLUMNS}"
    );
    let row: BudgetRow = query_as(&sql)
        .bind(budget_id)
        .bind(new.patient_id)
        .bind(new.doctor_id)
        .bind(&new.title)
        .bind(&new.notes)
        .bind(total_cents)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StorageError::not_found("patient", new.patient_id)
            } else {
                db_err("create budget", e)
            }
        })?;
    insert_items(&mut tx, &items).await?;
    tx.commit().await.map_err(|e| db_err("commit", e))?;

    Ok(BudgetWithItems {
        budget: budget_from_row(row)?,
        items,
    })
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<BudgetWithItems>, StorageError> {
    let sql = format!("SELECT {BUDGET_COLUMNS} FROM budgets WHERE id = $1");
    let row: Option<BudgetRow> = query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| db_err("read budget", e))?;
    match row {
        Some(row) => Ok(Some(BudgetWithItems {
            budget: budget_from_row(row)?,
            items: fetch_items(pool, id).await?,
        })),
        None => Ok(None),
    }
}

pub async fn list(
    pool: &PgPool,
    filter: BudgetFilter,
    page: Page,
) -> Result<Paged<Budget>, StorageError> {
    const WHERE: &str =
        "($1::uuid IS NULL OR patient_id = $1) AND ($2::text IS NULL OR status = $2)";
    let status = filter.status.map(|s| s.as_str().to_string());

    let total: i64 = query_scalar(&format!("SELECT COUNT(*) FROM budgets WHERE {WHERE}"))
        .bind(filter.patient_id)
        .bind(&status)
        .fetch_one(pool)
        .await
        .map_err(|e| db_err("count budgets", e))?;

    let sql = format!(
        "SELECT {BUDGET_COLUMNS} FROM budgets WHERE {WHERE} \
         ORDER BY created_at DESC, id LIMIT $3 OFFSET $4"
    );
    let rows: Vec<BudgetRow> = query_as(&sql)
        .bind(filter.patient_id)
        .bind(&status)
        .bind(i64::from(page.limit()))
        .bind(page.offset() as i64)
        .fetch_all(pool)
        .await
        .map_err(|e| db_err("list budgets", e))?;

    let budgets = rows
        .into_iter()
        .map(budget_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Paged::new(budgets, total as u64, page))
}

pub async fn update(
    pool: &PgPool,
    id: Uuid,
    update: BudgetUpdate,
) -> Result<BudgetWithItems, StorageError> {
    let (items, total_cents) = build_items(id, update.items);
    let mut tx = pool.begin().await.map_err(|e| db_err("begin", e))?;

    let sql = format!(
        "UPDATE budgets SET title = $2, notes = $3, total_cents = $4, updated_at = $5 \
         WHERE id = $1 AND status = 'draft' \
         RETURNING {BUDGET_COLUMNS}"
    );
    let row: Option<BudgetRow> = query_as(&sql)
        .bind(id)
        .bind(&update.title)
        .bind(&update.notes)
        .bind(total_cents)
        .bind(time_to_chrono(now_utc()))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_err("update budget", e))?;
    let Some(row) = row else {
        return Err(transition_error(&mut tx, id, "edited").await);
    };

    query("DELETE FROM budget_items WHERE budget_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("replace budget items", e))?;
    insert_items(&mut tx, &items).await?;
    tx.commit().await.map_err(|e| db_err("commit", e))?;

    Ok(BudgetWithItems {
        budget: budget_from_row(row)?,
        items,
    })
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), StorageError> {
    let mut tx = pool.begin().await.map_err(|e| db_err("begin", e))?;
    let result = query("DELETE FROM budgets WHERE id = $1 AND status = 'draft'")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("delete budget", e))?;
    if result.rows_affected() == 0 {
        return Err(transition_error(&mut tx, id, "deleted").await);
    }
    tx.commit().await.map_err(|e| db_err("commit", e))
}

pub async fn activate(pool: &PgPool, id: Uuid) -> Result<BudgetWithItems, StorageError> {
    let now = time_to_chrono(now_utc());
    let mut tx = pool.begin().await.map_err(|e| db_err("begin", e))?;

    let sql = format!(
        "UPDATE budgets SET status = 'active', activated_at = $2, updated_at = $2 \
         WHERE id = $1 AND status = 'draft' \
         RETURNING {BUDGET_COLUMNS}"
    );
    let row: Option<BudgetRow> = query_as(&sql)
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_err("activate budget", e))?;
    let Some(row) = row else {
        return Err(transition_error(&mut tx, id, "activated").await);
    };
    let budget = budget_from_row(row)?;

    let items = fetch_items_tx(&mut tx, id).await?;
    if items.is_empty() {
        // Returning drops the transaction and rolls the flip back.
        return Err(StorageError::conflict("an empty budget cannot be activated"));
    }

    for item in &items {
        query(
            "INSERT INTO treatment_sessions \
             (id, patient_id, doctor_id, budget_item_id, service_id, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, 'pending', $6, $6)",
        )
        .bind(generate_id())
        .bind(budget.patient_id)
        .bind(budget.doctor_id)
        .bind(item.id)
        .bind(item.service_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("materialise session", e))?;
    }
    tx.commit().await.map_err(|e| db_err("commit", e))?;

    Ok(BudgetWithItems { budget, items })
}

pub async fn complete(pool: &PgPool, id: Uuid) -> Result<BudgetWithItems, StorageError> {
    let now = time_to_chrono(now_utc());
    let mut tx = pool.begin().await.map_err(|e| db_err("begin", e))?;

    let sql = format!(
        "UPDATE budgets SET status = 'completed', completed_at = $2, updated_at = $2 \
         WHERE id = $1 AND status = 'active' \
         RETURNING {BUDGET_COLUMNS}"
    );
    let row: Option<BudgetRow> = query_as(&sql)
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_err("complete budget", e))?;
    let Some(row) = row else {
        return Err(transition_error(&mut tx, id, "completed").await);
    };

    let unsettled: i64 = query_scalar(
        "SELECT COUNT(*) FROM treatment_sessions \
         WHERE status = 'pending' \
         AND budget_item_id IN (SELECT id FROM budget_items WHERE budget_id = $1)",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| db_err("count unsettled sessions", e))?;
    if unsettled > 0 {
        return Err(StorageError::conflict(format!(
            "budget has {unsettled} unsettled treatment session(s)"
        )));
    }
    tx.commit().await.map_err(|e| db_err("commit", e))?;

    Ok(BudgetWithItems {
        budget: budget_from_row(row)?,
        items: fetch_items(pool, id).await?,
    })
}

pub async fn revert(pool: &PgPool, id: Uuid) -> Result<BudgetWithItems, StorageError> {
    let now = time_to_chrono(now_utc());
    let mut tx = pool.begin().await.map_err(|e| db_err("begin", e))?;

    let sql = format!(
        "UPDATE budgets SET status = 'draft', activated_at = NULL, updated_at = $2 \
         WHERE id = $1 AND status = 'active' \
         RETURNING {BUDGET_COLUMNS}"
    );
    let row: Option<BudgetRow> = query_as(&sql)
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_err("revert budget", e))?;
    let Some(row) = row else {
        return Err(transition_error(&mut tx, id, "reverted").await);
    };

    let completed: i64 = query_scalar(
        "SELECT COUNT(*) FROM treatment_sessions \
         WHERE status = 'completed' \
         AND budget_item_id IN (SELECT id FROM budget_items WHERE budget_id = $1)",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| db_err("count completed sessions", e))?;
    if completed > 0 {
        return Err(StorageError::conflict(
            "budget has completed treatment sessions and cannot be reverted",
        ));
    }

    query(
        "DELETE FROM treatment_sessions \
         WHERE status = 'pending' \
         AND budget_item_id IN (SELECT id FROM budget_items WHERE budget_id = $1)",
    )
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| db_err("delete materialised sessions", e))?;
    tx.commit().await.map_err(|e| db_err("commit", e))?;

    Ok(BudgetWithItems {
        budget: budget_from_row(row)?,
        items: fetch_items(pool, id).await?,
    })
}
