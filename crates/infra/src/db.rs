//! Database connection pool and schema.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, instrument};

use crate::AppConfig;

/// Tables used by the profile store and the record repository.
///
/// Idempotent; safe to run on every start in development.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS profiles (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('police', 'civilian')),
        display_name TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS police_stations (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        address TEXT NOT NULL,
        city TEXT NOT NULL,
        state TEXT NOT NULL,
        zip_code TEXT NOT NULL DEFAULT '',
        phone TEXT,
        email TEXT,
        latitude DOUBLE PRECISION,
        longitude DOUBLE PRECISION,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS officers (
        id UUID PRIMARY KEY,
        station_id UUID NOT NULL REFERENCES police_stations(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        rank TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT NOT NULL,
        age SMALLINT NOT NULL,
        gender TEXT NOT NULL,
        description TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS civilians (
        id UUID PRIMARY KEY,
        user_id UUID UNIQUE,
        name TEXT NOT NULL,
        phone TEXT,
        address TEXT,
        city TEXT,
        state TEXT,
        pincode TEXT,
        job TEXT,
        salary TEXT,
        is_criminal BOOLEAN NOT NULL DEFAULT false,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS crimes (
        id UUID PRIMARY KEY,
        civilian_id UUID NOT NULL REFERENCES civilians(id) ON DELETE CASCADE,
        description TEXT NOT NULL,
        date DATE NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS complaints (
        id UUID PRIMARY KEY,
        complainant_id UUID REFERENCES civilians(id) ON DELETE SET NULL,
        officer_id UUID REFERENCES officers(id) ON DELETE SET NULL,
        subject TEXT NOT NULL,
        description TEXT NOT NULL,
        status TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

#[instrument(skip(config), fields(max_connections = config.db_max_connections), err)]
pub async fn connect_pool(config: &AppConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    info!("connected to postgres");
    Ok(pool)
}

#[instrument(skip(pool), err)]
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
