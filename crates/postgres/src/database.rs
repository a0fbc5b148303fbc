use std::time::Duration;

use sqlx::{PgPool, Row, postgres::PgPoolOptions};

/// Creates a connection pool to the PostgreSQL database.
///
/// Acquisition is bounded so a saturated database surfaces an error rather
/// than hanging request handlers.
pub async fn create_connection_pool() -> Result<PgPool, sqlx::Error> {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/campsite_atlas".to_string());

    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&database_url)
        .await
}

/// Tests the database connection by executing a simple query.
pub async fn test_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    let row = sqlx::query("SELECT 1 as test").fetch_one(pool).await?;

    let test_value: i32 = row.get("test");
    debug_assert_eq!(test_value, 1);

    Ok(())
}
