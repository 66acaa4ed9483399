use sqlx::SqliteConnection;

use crate::db_types::Country;

/// The full country reference table, ordered by name.
pub async fn fetch_countries(conn: &mut SqliteConnection) -> Result<Vec<Country>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM countries ORDER BY name ASC").fetch_all(conn).await
}

pub async fn fetch_country_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Country>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM countries WHERE id = $1").bind(id).fetch_optional(conn).await
}
