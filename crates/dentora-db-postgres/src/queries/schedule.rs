//! Schedule block queries.
//!
//! Recurrence is stored as a discriminated row: `kind` plus the fields the
//! kind uses (`block_date` for single, `weekday_mask` for weekly).

use chrono::{DateTime, NaiveDate, Utc};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use uuid::Uuid;

use dentora_core::schedule::{BlockRecurrence, TimeRange, WeekdaySet};
use dentora_core::{ScheduleBlock, generate_id, now_utc};
use dentora_storage::StorageError;
use dentora_storage::types::NewScheduleBlock;

use super::{chrono_to_date, chrono_to_time, date_to_chrono, db_err, time_to_chrono};

type BlockRow = (
    Uuid,
    Uuid,
    String,
    Option<NaiveDate>,
    i16,
    i16,
    i16,
    Option<String>,
    DateTime<Utc>,
);

const COLUMNS: &str =
    "id, doctor_id, kind, block_date, weekday_mask, start_minute, end_minute, reason, created_at";

fn from_row(row: BlockRow) -> Result<ScheduleBlock, StorageError> {
    let recurrence = match row.2.as_str() {
        "single" => {
            let date = row
                .3
                .ok_or_else(|| StorageError::internal("single block without a date"))?;
            BlockRecurrence::Single {
                date: chrono_to_date(date),
            }
        }
        "daily" => BlockRecurrence::Daily,
        "weekly" => BlockRecurrence::Weekly {
            days: WeekdaySet::from_mask(row.4.max(0) as u8),
        },
        other => {
            return Err(StorageError::internal(format!(
                "stored block kind '{other}'"
            )));
        }
    };
    let range = TimeRange::new(row.5.max(0) as u16, row.6.max(0) as u16)
        .map_err(|e| StorageError::internal(format!("stored block range: {e}")))?;
    Ok(ScheduleBlock {
        id: row.0,
        doctor_id: row.1,
        recurrence,
        range,
        reason: row.7,
        created_at: chrono_to_time(row.8),
    })
}

pub async fn create(pool: &PgPool, new: NewScheduleBlock) -> Result<ScheduleBlock, StorageError> {
    let (kind, block_date, weekday_mask) = match new.recurrence {
        BlockRecurrence::Single { date } => ("single", Some(date_to_chrono(date)), 0i16),
        BlockRecurrence::Daily => ("daily", None, 0),
        BlockRecurrence::Weekly { days } => ("weekly", None, i16::from(days.mask())),
    };
    let sql = format!(
        "INSERT INTO schedule_blocks \
         (id, doctor_id, kind, block_date, weekday_mask, start_minute, end_minute, reason, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING {COLUMNS}"
    );
    let row: BlockRow = query_as(&sql)
        .bind(generate_id())
        .bind(new.doctor_id)
        .bind(kind)
        .bind(block_date)
        .bind(weekday_mask)
        .bind(new.range.start_minute as i16)
        .bind(new.range.end_minute as i16)
        .bind(&new.reason)
        .bind(time_to_chrono(now_utc()))
        .fetch_one(pool)
        .await
        .map_err(|e| db_err("create schedule block", e))?;
    from_row(row)
}

pub async fn list(
    pool: &PgPool,
    doctor_id: Option<Uuid>,
) -> Result<Vec<ScheduleBlock>, StorageError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM schedule_blocks \
         WHERE $1::uuid IS NULL OR doctor_id = $1 \
         ORDER BY created_at DESC, id"
    );
    let rows: Vec<BlockRow> = query_as(&sql)
        .bind(doctor_id)
        .fetch_all(pool)
        .await
        .map_err(|e| db_err("list schedule blocks", e))?;
    rows.into_iter().map(from_row).collect()
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), StorageError> {
    let result = query("DELETE FROM schedule_blocks WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| db_err("delete schedule block", e))?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("schedule block", id));
    }
    Ok(())
}
