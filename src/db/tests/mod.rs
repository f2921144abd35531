use crate::db::*;
use tempfile::NamedTempFile;


/// Fresh database in a temp file; keep the file alive for the test's duration
async fn setup_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}
