//! Treatment session queries and revenue aggregation.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::{PgPool, PgTransaction};
use time::Date;
use uuid::Uuid;

use dentora_core::{CoreError, SessionStatus, TreatmentSession, generate_id, now_utc};
use dentora_storage::StorageError;
use dentora_storage::types::{
    NewSession, Page, Paged, RevenueBucket, SessionFilter, SessionUpdate,
};

use super::{chrono_to_date, chrono_to_time, date_to_chrono, db_err, time_to_chrono};
use crate::error::is_foreign_key_violation;

type SessionRow = (
    Uuid,
    Uuid,
    Uuid,
    Option<Uuid>,
    Option<Uuid>,
    Option<Uuid>,
    String,
    Option<NaiveDate>,
    Option<i16>,
    Option<i16>,
    Option<i64>,
    Option<DateTime<Utc>>,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const COLUMNS: &str = "id, patient_id, doctor_id, budget_item_id, service_id, location_id, \
     status, scheduled_date, start_minute, end_minute, charged_amount_cents, performed_at, \
     notes, created_at, updated_at";

fn from_row(row: SessionRow) -> Result<TreatmentSession, StorageError> {
    let status: SessionStatus = row
        .6
        .parse()
        .map_err(|e: CoreError| StorageError::internal(format!("stored session status: {e}")))?;
    Ok(TreatmentSession {
        id: row.0,
        patient_id: row.1,
        doctor_id: row.2,
        budget_item_id: row.3,
        service_id: row.4,
        location_id: row.5,
        status,
        scheduled_date: row.7.map(chrono_to_date),
        start_minute: row.8.map(|m| m.max(0) as u16),
        end_minute: row.9.map(|m| m.max(0) as u16),
        charged_amount_cents: row.10,
        performed_at: row.11.map(chrono_to_time),
        notes: row.12,
        created_at: chrono_to_time(row.13),
        updated_at: chrono_to_time(row.14),
    })
}

fn fk_error(e: sqlx_core::error::Error, context: &str) -> StorageError {
    if is_foreign_key_violation(&e) {
        StorageError::invalid_entity(
            "patient_id, service_id or location_id does not reference a known entity",
        )
    } else {
        db_err(context, e)
    }
}

/// Resolves why a conditional update matched no row.
async fn transition_error(
    tx: &mut PgTransaction<'_>,
    id: Uuid,
    action: &str,
) -> StorageError {
    let status: Result<Option<String>, _> =
        query_scalar("SELECT status FROM treatment_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await;
    match status {
        Ok(Some(status)) => {
            CoreError::invalid_transition("treatment session", action, status).into()
        }
        Ok(None) => StorageError::not_found("treatment session", id),
        Err(e) => db_err("read session status", e),
    }
}

pub async fn create(pool: &PgPool, new: NewSession) -> Result<TreatmentSession, StorageError> {
    let sql = format!(
        "INSERT INTO treatment_sessions \
         (id, patient_id, doctor_id, service_id, location_id, status, scheduled_date, \
          start_minute, end_minute, notes, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $8, $9, $10, $10) \
         RETURNING {COLUMNS}"
    );
    let row: SessionRow = query_as(&sql)
        .bind(generate_id())
        .bind(new.patient_id)
        .bind(new.doctor_id)
        .bind(new.service_id)
        .bind(new.location_id)
        .bind(new.scheduled_date.map(date_to_chrono))
        .bind(new.start_minute.map(|m| m as i16))
        .bind(new.end_minute.map(|m| m as i16))
        .bind(&new.notes)
        .bind(time_to_chrono(now_utc()))
        .fetch_one(pool)
        .await
        .map_err(|e| fk_error(e, "create session"))?;
    from_row(row)
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<TreatmentSession>, StorageError> {
    let sql = format!("SELECT {COLUMNS} FROM treatment_sessions WHERE id = $1");
    let row: Option<SessionRow> = query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| db_err("read session", e))?;
    row.map(from_row).transpose()
}

pub async fn list(
    pool: &PgPool,
    filter: SessionFilter,
    page: Page,
) -> Result<Paged<TreatmentSession>, StorageError> {
    const WHERE: &str = "($1::uuid IS NULL OR patient_id = $1) \
         AND ($2::uuid IS NULL OR doctor_id = $2) \
         AND ($3::uuid IS NULL OR budget_item_id IN \
              (SELECT id FROM budget_items WHERE budget_id = $3)) \
         AND ($4::text IS NULL OR status = $4) \
         AND ($5::date IS NULL OR scheduled_date >= $5) \
         AND ($6::date IS NULL OR scheduled_date <= $6)";
    let status = filter.status.map(|s| s.as_str().to_string());
    let from = filter.from.map(date_to_chrono);
    let to = filter.to.map(date_to_chrono);

    let total: i64 = query_scalar(&format!(
        "SELECT COUNT(*) FROM treatment_sessions WHERE {WHERE}"
    ))
    .bind(filter.patient_id)
    .bind(filter.doctor_id)
    .bind(filter.budget_id)
    .bind(&status)
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await
    .map_err(|e| db_err("count sessions", e))?;

    let sql = format!(
        "SELECT {COLUMNS} FROM treatment_sessions WHERE {WHERE} \
         ORDER BY created_at DESC, id LIMIT $7 OFFSET $8"
    );
    let rows: Vec<SessionRow> = query_as(&sql)
        .bind(filter.patient_id)
        .bind(filter.doctor_id)
        .bind(filter.budget_id)
        .bind(&status)
        .bind(from)
        .bind(to)
        .bind(i64::from(page.limit()))
        .bind(page.offset() as i64)
        .fetch_all(pool)
        .await
        .map_err(|e| db_err("list sessions", e))?;

    let sessions = rows
        .into_iter()
        .map(from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Paged::new(sessions, total as u64, page))
}

pub async fn update(
    pool: &PgPool,
    id: Uuid,
    update: SessionUpdate,
) -> Result<TreatmentSession, StorageError> {
    let mut tx = pool.begin().await.map_err(|e| db_err("begin", e))?;
    let sql = format!(
        "UPDATE treatment_sessions SET scheduled_date = $2, start_minute = $3, \
         end_minute = $4, location_id = $5, notes = $6, updated_at = $7 \
         WHERE id = $1 AND status = 'pending' \
         RETURNING {COLUMNS}"
    );
    let row: Option<SessionRow> = query_as(&sql)
        .bind(id)
        .bind(update.scheduled_date.map(date_to_chrono))
        .bind(update.start_minute.map(|m| m as i16))
        .bind(update.end_minute.map(|m| m as i16))
        .bind(update.location_id)
        .bind(&update.notes)
        .bind(time_to_chrono(now_utc()))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| fk_error(e, "update session"))?;
    let Some(row) = row else {
        return Err(transition_error(&mut tx, id, "edited").await);
    };
    tx.commit().await.map_err(|e| db_err("commit", e))?;
    from_row(row)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), StorageError> {
    let mut tx = pool.begin().await.map_err(|e| db_err("begin", e))?;
    let result = query("DELETE FROM treatment_sessions WHERE id = $1 AND status = 'pending'")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("delete session", e))?;
    if result.rows_affected() == 0 {
        return Err(transition_error(&mut tx, id, "deleted").await);
    }
    tx.commit().await.map_err(|e| db_err("commit", e))
}

pub async fn complete(
    pool: &PgPool,
    id: Uuid,
    charged_amount_cents: Option<i64>,
) -> Result<TreatmentSession, StorageError> {
    let mut tx = pool.begin().await.map_err(|e| db_err("begin", e))?;
    // The charged amount falls back to the linked item's unit price, then the
    // catalog price of the session's service.
    let sql = format!(
        "UPDATE treatment_sessions s SET status = 'completed', performed_at = $2, \
         updated_at = $2, charged_amount_cents = COALESCE( \
             $3, \
             (SELECT unit_price_cents FROM budget_items WHERE id = s.budget_item_id), \
             (SELECT price_cents FROM services WHERE id = s.service_id), \
             0) \
         WHERE s.id = $1 AND s.status = 'pending' \
         RETURNING {COLUMNS}"
    );
    let row: Option<SessionRow> = query_as(&sql)
        .bind(id)
        .bind(time_to_chrono(now_utc()))
        .bind(charged_amount_cents)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_err("complete session", e))?;
    let Some(row) = row else {
        return Err(transition_error(&mut tx, id, "completed").await);
    };
    tx.commit().await.map_err(|e| db_err("commit", e))?;
    from_row(row)
}

pub async fn cancel(pool: &PgPool, id: Uuid) -> Result<TreatmentSession, StorageError> {
    let mut tx = pool.begin().await.map_err(|e| db_err("begin", e))?;
    let sql = format!(
        "UPDATE treatment_sessions SET status = 'cancelled', updated_at = $2 \
         WHERE id = $1 AND status = 'pending' \
         RETURNING {COLUMNS}"
    );
    let row: Option<SessionRow> = query_as(&sql)
        .bind(id)
        .bind(time_to_chrono(now_utc()))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_err("cancel session", e))?;
    let Some(row) = row else {
        return Err(transition_error(&mut tx, id, "cancelled").await);
    };
    tx.commit().await.map_err(|e| db_err("commit", e))?;
    from_row(row)
}

pub async fn revenue_by_month(
    pool: &PgPool,
    from: Date,
    to: Date,
) -> Result<Vec<RevenueBucket>, StorageError> {
    let rows: Vec<(i32, i32, i64, i64)> = query_as(
        "SELECT EXTRACT(YEAR FROM performed_at)::int, EXTRACT(MONTH FROM performed_at)::int, \
                COALESCE(SUM(charged_amount_cents), 0)::bigint, COUNT(*)::bigint \
         FROM treatment_sessions \
         WHERE status = 'completed' AND performed_at IS NOT NULL \
           AND performed_at::date BETWEEN $1 AND $2 \
         GROUP BY 1, 2 ORDER BY 1, 2",
    )
    .bind(date_to_chrono(from))
    .bind(date_to_chrono(to))
    .fetch_all(pool)
    .await
    .map_err(|e| db_err("revenue by month", e))?;

    Ok(rows
        .into_iter()
        .map(|(year, month, total_cents, completed_sessions)| RevenueBucket {
            year,
            month: month.clamp(1, 12) as u8,
            total_cents,
            completed_sessions: completed_sessions.max(0) as u64,
        })
        .collect())
}
