//! Patient queries.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use uuid::Uuid;

use dentora_core::{Patient, generate_id, now_utc};
use dentora_storage::StorageError;
use dentora_storage::types::{NewPatient, Page, Paged, PatientFilter, PatientUpdate};

use super::{chrono_to_date, chrono_to_time, date_to_chrono, db_err, time_to_chrono};
use crate::error::is_foreign_key_violation;

type PatientRow = (
    Uuid,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<NaiveDate>,
    Option<Uuid>,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const COLUMNS: &str =
    "id, first_name, last_name, email, phone, birth_date, doctor_id, notes, created_at, updated_at";

fn from_row(row: PatientRow) -> Patient {
    Patient {
        id: row.0,
        first_name: row.1,
        last_name: row.2,
        email: row.3,
        phone: row.4,
        birth_date: row.5.map(chrono_to_date),
        doctor_id: row.6,
        notes: row.7,
        created_at: chrono_to_time(row.8),
        updated_at: chrono_to_time(row.9),
    }
}

pub async fn create(pool: &PgPool, new: NewPatient) -> Result<Patient, StorageError> {
    let sql = format!(
        "INSERT INTO patients \
         (id, first_name, last_name, email, phone, birth_date, doctor_id, notes, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) \
         RETURNING {COLUMNS}"
    );
    let row: PatientRow = query_as(&sql)
        .bind(generate_id())
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(new.birth_date.map(date_to_chrono))
        .bind(new.doctor_id)
        .bind(&new.notes)
        .bind(time_to_chrono(now_utc()))
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StorageError::invalid_entity("doctor_id does not reference a known doctor")
            } else {
                db_err("create patient", e)
            }
        })?;
    Ok(from_row(row))
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Patient>, StorageError> {
    let sql = format!("SELECT {COLUMNS} FROM patients WHERE id = $1 AND deleted_at IS NULL");
    let row: Option<PatientRow> = query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| db_err("read patient", e))?;
    Ok(row.map(from_row))
}

pub async fn list(
    pool: &PgPool,
    filter: PatientFilter,
    page: Page,
) -> Result<Paged<Patient>, StorageError> {
    const WHERE: &str = "deleted_at IS NULL \
         AND ($1::uuid IS NULL OR doctor_id = $1) \
         AND ($2::text IS NULL OR first_name || ' ' || last_name ILIKE '%' || $2 || '%')";

    let total: i64 = query_scalar(&format!("SELECT COUNT(*) FROM patients WHERE {WHERE}"))
        .bind(filter.doctor_id)
        .bind(&filter.query)
        .fetch_one(pool)
        .await
        .map_err(|e| db_err("count patients", e))?;

    let sql = format!(
        "SELECT {COLUMNS} FROM patients WHERE {WHERE} \
         ORDER BY created_at DESC, id LIMIT $3 OFFSET $4"
    );
    let rows: Vec<PatientRow> = query_as(&sql)
        .bind(filter.doctor_id)
        .bind(&filter.query)
        .bind(i64::from(page.limit()))
        .bind(page.offset() as i64)
        .fetch_all(pool)
        .await
        .map_err(|e| db_err("list patients", e))?;

    Ok(Paged::new(
        rows.into_iter().map(from_row).collect(),
        total as u64,
        page,
    ))
}

pub async fn update(
    pool: &PgPool,
    id: Uuid,
    update: PatientUpdate,
) -> Result<Patient, StorageError> {
    let sql = format!(
        "UPDATE patients SET first_name = $2, last_name = $3, email = $4, phone = $5, \
         birth_date = $6, doctor_id = $7, notes = $8, updated_at = $9 \
         WHERE id = $1 AND deleted_at IS NULL \
         RETURNING {COLUMNS}"
    );
    let row: Option<PatientRow> = query_as(&sql)
        .bind(id)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.email)
        .bind(&update.phone)
        .bind(update.birth_date.map(date_to_chrono))
        .bind(update.doctor_id)
        .bind(&update.notes)
        .bind(time_to_chrono(now_utc()))
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StorageError::invalid_entity("doctor_id does not reference a known doctor")
            } else {
                db_err("update patient", e)
            }
        })?;
    row.map(from_row)
        .ok_or_else(|| StorageError::not_found("patient", id))
}

pub async fn soft_delete(pool: &PgPool, id: Uuid) -> Result<(), StorageError> {
    // The open-budget guard rides inside the statement so the check and the
    // delete cannot interleave with a concurrent activation.
    let result = query(
        "UPDATE patients SET deleted_at = $2 \
         WHERE id = $1 AND deleted_at IS NULL \
         AND NOT EXISTS (SELECT 1 FROM budgets WHERE patient_id = $1 AND status <> 'draft')",
    )
    .bind(id)
    .bind(time_to_chrono(now_utc()))
    .execute(pool)
    .await
    .map_err(|e| db_err("delete patient", e))?;

    if result.rows_affected() > 0 {
        return Ok(());
    }
    if get(pool, id).await?.is_some() {
        Err(StorageError::conflict(
            "patient has budgets beyond draft and cannot be deleted",
        ))
    } else {
        Err(StorageError::not_found("patient", id))
    }
}
