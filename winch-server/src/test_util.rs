//! Shared test helpers

use crate::db::Db;

/// A migrated database in a scratch directory. The directory doubles as a
/// data root for subprocess tests; keep it alive for the test's duration.
pub async fn test_db() -> (Db, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("failed to create scratch dir");
    let url = format!("sqlite://{}", dir.path().join("winch.db").display());
    let db = Db::connect(&url).await.expect("failed to open test db");
    db.migrate().await.expect("failed to migrate test db");
    (db, dir)
}
