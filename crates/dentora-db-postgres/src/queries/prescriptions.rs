//! Prescription queries.

use chrono::{DateTime, Utc};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use uuid::Uuid;

use dentora_core::{Prescription, PrescriptionItem, generate_id, now_utc};
use dentora_storage::StorageError;
use dentora_storage::types::{NewPrescription, Page, Paged, PrescriptionWithItems};

use super::{chrono_to_time, db_err, time_to_chrono};
use crate::error::is_foreign_key_violation;

type PrescriptionRow = (Uuid, Uuid, Uuid, DateTime<Utc>, Option<String>, DateTime<Utc>);

type ItemRow = (
    Uuid,
    Uuid,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    i32,
);

const COLUMNS: &str = "id, patient_id, doctor_id, issued_at, notes, created_at";

const ITEM_COLUMNS: &str =
    "id, prescription_id, drug, dosage, frequency, duration, instructions, position";

fn from_row(row: PrescriptionRow) -> Prescription {
    Prescription {
        id: row.0,
        patient_id: row.1,
        doctor_id: row.2,
        issued_at: chrono_to_time(row.3),
        notes: row.4,
        created_at: chrono_to_time(row.5),
    }
}

fn item_from_row(row: ItemRow) -> PrescriptionItem {
    PrescriptionItem {
        id: row.0,
        prescription_id: row.1,
        drug: row.2,
        dosage: row.3,
        frequency: row.4,
        duration: row.5,
        instructions: row.6,
        position: row.7,
    }
}

async fn fetch_items(
    pool: &PgPool,
    prescription_id: Uuid,
) -> Result<Vec<PrescriptionItem>, StorageError> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM prescription_items \
         WHERE prescription_id = $1 ORDER BY position"
    );
    let rows: Vec<ItemRow> = query_as(&sql)
        .bind(prescription_id)
        .fetch_all(pool)
        .await
        .map_err(|e| db_err("list prescription items", e))?;
    Ok(rows.into_iter().map(item_from_row).collect())
}

pub async fn create(
    pool: &PgPool,
    new: NewPrescription,
) -> Result<PrescriptionWithItems, StorageError> {
    let prescription_id = generate_id();
    let now = now_utc();
    let issued_at = new.issued_at.unwrap_or(now);

    let mut tx = pool.begin().await.map_err(|e| db_err("begin", e))?;
    let sql = format!(
        "INSERT INTO prescriptions (id, patient_id, doctor_id, issued_at, notes, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {COLUMNS}"
    );
    let row: PrescriptionRow = query_as(&sql)
        .bind(prescription_id)
        .bind(new.patient_id)
        .bind(new.doctor_id)
        .bind(time_to_chrono(issued_at))
        .bind(&new.notes)
        .bind(time_to_chrono(now))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StorageError::not_found("patient", new.patient_id)
            } else {
                db_err("create prescription", e)
            }
        })?;

    let mut items = Vec::with_capacity(new.items.len());
    for (position, item) in new.items.into_iter().enumerate() {
        let stored = PrescriptionItem {
            id: generate_id(),
            prescription_id,
            drug: item.drug,
            dosage: item.dosage,
            frequency: item.frequency,
            duration: item.duration,
            instructions: item.instructions,
            position: position as i32,
        };
        query(
            "INSERT INTO prescription_items \
             (id, prescription_id, drug, dosage, frequency, duration, instructions, position) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(stored.id)
        .bind(stored.prescription_id)
        .bind(&stored.drug)
        .bind(&stored.dosage)
        .bind(&stored.frequency)
        .bind(&stored.duration)
        .bind(&stored.instructions)
        .bind(stored.position)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("insert prescription item", e))?;
        items.push(stored);
    }
    tx.commit().await.map_err(|e| db_err("commit", e))?;

    Ok(PrescriptionWithItems {
        prescription: from_row(row),
        items,
    })
}

pub async fn get(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<PrescriptionWithItems>, StorageError> {
    let sql = format!("SELECT {COLUMNS} FROM prescriptions WHERE id = $1");
    let row: Option<PrescriptionRow> = query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| db_err("read prescription", e))?;
    match row {
        Some(row) => Ok(Some(PrescriptionWithItems {
            prescription: from_row(row),
            items: fetch_items(pool, id).await?,
        })),
        None => Ok(None),
    }
}

pub async fn list(
    pool: &PgPool,
    patient_id: Option<Uuid>,
    page: Page,
) -> Result<Paged<Prescription>, StorageError> {
    const WHERE: &str = "$1::uuid IS NULL OR patient_id = $1";

    let total: i64 = query_scalar(&format!("SELECT COUNT(*) FROM prescriptions WHERE {WHERE}"))
        .bind(patient_id)
        .fetch_one(pool)
        .await
        .map_err(|e| db_err("count prescriptions", e))?;

    let sql = format!(
        "SELECT {COLUMNS} FROM prescriptions WHERE {WHERE} \
         ORDER BY created_at DESC, id LIMIT $2 OFFSET $3"
    );
    let rows: Vec<PrescriptionRow> = query_as(&sql)
        .bind(patient_id)
        .bind(i64::from(page.limit()))
        .bind(page.offset() as i64)
        .fetch_all(pool)
        .await
        .map_err(|e| db_err("list prescriptions", e))?;

    Ok(Paged::new(
        rows.into_iter().map(from_row).collect(),
        total as u64,
        page,
    ))
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), StorageError> {
    let result = query("DELETE FROM prescriptions WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| db_err("delete prescription", e))?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("prescription", id));
    }
    Ok(())
}
