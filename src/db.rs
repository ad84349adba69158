use sqlx::{
    MySqlPool, Row,
    mysql::{MySqlConnectOptions, MySqlPoolOptions},
};

use crate::args::DbArgs;

impl DbArgs {
    pub fn connect_options(&self) -> MySqlConnectOptions {
        let options = MySqlConnectOptions::new()
            .host(&self.db_host)
            .port(self.db_port)
            .username(&self.db_user)
            .database(&self.db_name);

        if self.db_password.is_empty() {
            options
        } else {
            options.password(&self.db_password)
        }
    }
}

/// Provisioning runs statements one after another, so the pool holds a single
/// connection.
pub async fn create_pool(db: &DbArgs) -> Result<MySqlPool, sqlx::Error> {
    tracing::info!(
        "Connecting to MySQL host={} port={} database={} user={}",
        &db.db_host,
        db.db_port,
        &db.db_name,
        &db.db_user
    );

    MySqlPoolOptions::new()
        .max_connections(1)
        .connect_with(db.connect_options())
        .await
}

pub async fn column_exists(
    pool: &MySqlPool,
    table: &str,
    column: &str,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query(
        "
            SELECT COUNT(*) AS column_count FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_NAME = ?
                AND COLUMN_NAME = ?
        ",
    )
    .bind(table)
    .bind(column)
    .fetch_one(pool)
    .await?
    .get("column_count");

    Ok(count > 0)
}

pub async fn count_rows(pool: &MySqlPool, table: &str) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT COUNT(*) AS row_count FROM `{}`", table))
        .fetch_one(pool)
        .await?;

    Ok(row.get("row_count"))
}
