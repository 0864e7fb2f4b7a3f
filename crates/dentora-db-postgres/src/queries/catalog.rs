//! Catalog queries: services, locations, doctors.

use chrono::{DateTime, Utc};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use uuid::Uuid;

use dentora_core::{Doctor, Location, Service, generate_id, now_utc};
use dentora_storage::StorageError;
use dentora_storage::types::{NewDoctor, NewLocation, NewService, ServiceUpdate};

use super::{chrono_to_time, db_err, time_to_chrono};
use crate::error::is_foreign_key_violation;

type ServiceRow = (
    Uuid,
    String,
    Option<String>,
    i64,
    Option<i16>,
    bool,
    DateTime<Utc>,
);

type LocationRow = (Uuid, String, Option<String>, DateTime<Utc>);

type DoctorRow = (Uuid, String, Option<String>, bool, DateTime<Utc>);

const SERVICE_COLUMNS: &str =
    "id, name, category, price_cents, duration_minutes, active, created_at";

fn service_from_row(row: ServiceRow) -> Service {
    Service {
        id: row.0,
        name: row.1,
        category: row.2,
        price_cents: row.3,
        duration_minutes: row.4.map(|m| m.max(0) as u16),
        active: row.5,
        created_at: chrono_to_time(row.6),
    }
}

fn location_from_row(row: LocationRow) -> Location {
    Location {
        id: row.0,
        name: row.1,
        description: row.2,
        created_at: chrono_to_time(row.3),
    }
}

fn doctor_from_row(row: DoctorRow) -> Doctor {
    Doctor {
        id: row.0,
        full_name: row.1,
        email: row.2,
        active: row.3,
        created_at: chrono_to_time(row.4),
    }
}

// ---- Services ----

pub async fn create_service(pool: &PgPool, new: NewService) -> Result<Service, StorageError> {
    let sql = format!(
        "INSERT INTO services (id, name, category, price_cents, duration_minutes, active, created_at) \
         VALUES ($1, $2, $3, $4, $5, TRUE, $6) \
         RETURNING {SERVICE_COLUMNS}"
    );
    let row: ServiceRow = query_as(&sql)
        .bind(generate_id())
        .bind(&new.name)
        .bind(&new.category)
        .bind(new.price_cents)
        .bind(new.duration_minutes.map(|m| m as i16))
        .bind(time_to_chrono(now_utc()))
        .fetch_one(pool)
        .await
        .map_err(|e| db_err("create service", e))?;
    Ok(service_from_row(row))
}

pub async fn get_service(pool: &PgPool, id: Uuid) -> Result<Option<Service>, StorageError> {
    let sql = format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = $1");
    let row: Option<ServiceRow> = query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| db_err("read service", e))?;
    Ok(row.map(service_from_row))
}

pub async fn list_services(pool: &PgPool) -> Result<Vec<Service>, StorageError> {
    let sql = format!(
        "SELECT {SERVICE_COLUMNS} FROM services ORDER BY active DESC, name, id"
    );
    let rows: Vec<ServiceRow> = query_as(&sql)
        .fetch_all(pool)
        .await
        .map_err(|e| db_err("list services", e))?;
    Ok(rows.into_iter().map(service_from_row).collect())
}

pub async fn update_service(
    pool: &PgPool,
    id: Uuid,
    update: ServiceUpdate,
) -> Result<Service, StorageError> {
    let sql = format!(
        "UPDATE services SET name = $2, category = $3, price_cents = $4, \
         duration_minutes = $5, active = $6 \
         WHERE id = $1 \
         RETURNING {SERVICE_COLUMNS}"
    );
    let row: Option<ServiceRow> = query_as(&sql)
        .bind(id)
        .bind(&update.name)
        .bind(&update.category)
        .bind(update.price_cents)
        .bind(update.duration_minutes.map(|m| m as i16))
        .bind(update.active)
        .fetch_optional(pool)
        .await
        .map_err(|e| db_err("update service", e))?;
    row.map(service_from_row)
        .ok_or_else(|| StorageError::not_found("service", id))
}

pub async fn delete_service(pool: &PgPool, id: Uuid) -> Result<(), StorageError> {
    let result = query("DELETE FROM services WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StorageError::conflict(
                    "service is referenced by budget items and cannot be deleted",
                )
            } else {
                db_err("delete service", e)
            }
        })?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("service", id));
    }
    Ok(())
}

// ---- Locations ----

pub async fn create_location(pool: &PgPool, new: NewLocation) -> Result<Location, StorageError> {
    let row: LocationRow = query_as(
        "INSERT INTO locations (id, name, description, created_at) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, name, description, created_at",
    )
    .bind(generate_id())
    .bind(&new.name)
    .bind(&new.description)
    .bind(time_to_chrono(now_utc()))
    .fetch_one(pool)
    .await
    .map_err(|e| db_err("create location", e))?;
    Ok(location_from_row(row))
}

pub async fn get_location(pool: &PgPool, id: Uuid) -> Result<Option<Location>, StorageError> {
    let row: Option<LocationRow> =
        query_as("SELECT id, name, description, created_at FROM locations WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| db_err("read location", e))?;
    Ok(row.map(location_from_row))
}

pub async fn list_locations(pool: &PgPool) -> Result<Vec<Location>, StorageError> {
    let rows: Vec<LocationRow> =
        query_as("SELECT id, name, description, created_at FROM locations ORDER BY name, id")
            .fetch_all(pool)
            .await
            .map_err(|e| db_err("list locations", e))?;
    Ok(rows.into_iter().map(location_from_row).collect())
}

pub async fn delete_location(pool: &PgPool, id: Uuid) -> Result<(), StorageError> {
    let result = query("DELETE FROM locations WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StorageError::conflict(
                    "location is referenced by treatment sessions and cannot be deleted",
                )
            } else {
                db_err("delete location", e)
            }
        })?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("location", id));
    }
    Ok(())
}

// ---- Doctors ----

pub async fn create_doctor(pool: &PgPool, new: NewDoctor) -> Result<Doctor, StorageError> {
    let row: DoctorRow = query_as(
        "INSERT INTO doctors (id, full_name, email, active, created_at) \
         VALUES ($1, $2, $3, TRUE, $4) \
         RETURNING id, full_name, email, active, created_at",
    )
    .bind(generate_id())
    .bind(&new.full_name)
    .bind(&new.email)
    .bind(time_to_chrono(now_utc()))
    .fetch_one(pool)
    .await
    .map_err(|e| db_err("create doctor", e))?;
    Ok(doctor_from_row(row))
}

pub async fn get_doctor(pool: &PgPool, id: Uuid) -> Result<Option<Doctor>, StorageError> {
    let row: Option<DoctorRow> =
        query_as("SELECT id, full_name, email, active, created_at FROM doctors WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| db_err("read doctor", e))?;
    Ok(row.map(doctor_from_row))
}

pub async fn list_doctors(pool: &PgPool) -> Result<Vec<Doctor>, StorageError> {
    let rows: Vec<DoctorRow> = query_as(
        "SELECT id, full_name, email, active, created_at FROM doctors ORDER BY full_name, id",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| db_err("list doctors", e))?;
    Ok(rows.into_iter().map(doctor_from_row).collect())
}
