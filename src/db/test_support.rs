use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tempfile::TempDir;

use super::schema::create_tables;

/// File-backed SQLite database with the full schema. Keep the `TempDir` alive for the test.
pub async fn create_test_db() -> (DatabaseConnection, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("hotspot_sync_test.db");
    let mut opt = ConnectOptions::new(format!("sqlite://{}?mode=rwc", db_path.display()));
    opt.max_connections(4).sqlx_logging(false);
    let conn = Database::connect(opt).await.unwrap();
    create_tables(&conn).await.unwrap();
    (conn, temp_dir)
}
