//! SingleFileDatabase - blob store に置いた SQLite ファイル 1 つを DB として使う
//!
//! # 読み取り
//! 最新のファイルを一時ファイルにダウンロードして開き、結果を返す。ロックは取らない。
//! アップロードは object 単位で置き換わるので、途中まで書かれた版を読むことはない。
//!
//! # 書き込み
//! 1. ロックマーカーを取得（`BlobLock`）
//! 2. ダウンロードして開き、`PRAGMA foreign_keys = ON` のもとで 1 トランザクション実行
//! 3. commit 後のファイルをアップロード
//! 4. マーカーを削除
//!
//! 2〜3 のどこで失敗してもマーカーは消してからエラーを返す。
//! rusqlite は同期 API なので、ファイル操作と SQL は `spawn_blocking` で実行する。

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql, params_from_iter};
use tempfile::NamedTempFile;

use crate::domain::errors::DbError;
use crate::impls::blob_lock::BlobLock;
use crate::ports::database::{Database, Dialect, Row, SqlValue, Statement};

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Text(String::from_utf8_lossy(b).into_owned()),
    }
}

pub(crate) fn query_rows(
    conn: &Connection,
    sql: &str,
    params: &[SqlValue],
) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (i, column) in columns.iter().enumerate() {
            record.insert(column.clone(), from_value_ref(row.get_ref(i)?));
        }
        out.push(record);
    }
    Ok(out)
}

/// 1 トランザクションで全 statement を適用し、影響行数の合計を返す
pub(crate) fn apply_statements(
    conn: &mut Connection,
    statements: &[Statement],
) -> rusqlite::Result<u64> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    let tx = conn.transaction()?;
    let mut affected = 0u64;
    for statement in statements {
        affected += tx.execute(&statement.sql, params_from_iter(statement.params.iter()))? as u64;
    }
    tx.commit()?;
    Ok(affected)
}

pub struct SingleFileDatabase {
    store: Arc<dyn ObjectStore>,
    file: Path,
    lock: BlobLock,
}

impl SingleFileDatabase {
    pub fn new(store: Arc<dyn ObjectStore>, file: Path, lock: BlobLock) -> Self {
        Self { store, file, lock }
    }

    pub fn lock(&self) -> &BlobLock {
        &self.lock
    }

    /// ファイルが無ければ作り、`ddl` を流す（`IF NOT EXISTS` 前提で何度でも実行できる）
    pub async fn bootstrap(&self, ddl: &str) -> Result<(), DbError> {
        let token = self.lock.acquire().await?;
        let result = self.bootstrap_locked(ddl.to_string()).await;
        self.finish(&token, result).await
    }

    async fn bootstrap_locked(&self, ddl: String) -> Result<(), DbError> {
        let current = match self.download().await {
            Ok(bytes) => bytes,
            Err(DbError::FileMissing(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        let updated = blocking(move || {
            let file = materialize(&current)?;
            let conn = Connection::open(file.path())?;
            conn.execute_batch(&ddl)?;
            close(conn)?;
            Ok(std::fs::read(file.path())?)
        })
        .await?;
        self.upload(updated).await?;
        tracing::info!(file = %self.file, "database bootstrapped");
        Ok(())
    }

    async fn download(&self) -> Result<Vec<u8>, DbError> {
        match self.store.get(&self.file).await {
            Ok(result) => {
                let bytes = result
                    .bytes()
                    .await
                    .map_err(|e| DbError::Transfer(Box::new(e)))?;
                Ok(bytes.to_vec())
            }
            Err(object_store::Error::NotFound { .. }) => {
                Err(DbError::FileMissing(self.file.to_string()))
            }
            Err(e) => Err(DbError::Transfer(Box::new(e))),
        }
    }

    async fn upload(&self, bytes: Vec<u8>) -> Result<(), DbError> {
        self.store
            .put(&self.file, PutPayload::from(bytes))
            .await
            .map_err(|e| DbError::Transfer(Box::new(e)))?;
        Ok(())
    }

    async fn write_locked(&self, statements: Vec<Statement>) -> Result<u64, DbError> {
        let current = self.download().await?;
        let (updated, affected) = blocking(move || {
            let file = materialize(&current)?;
            let mut conn = Connection::open(file.path())?;
            let affected = apply_statements(&mut conn, &statements)?;
            close(conn)?;
            Ok((std::fs::read(file.path())?, affected))
        })
        .await?;
        self.upload(updated).await?;
        Ok(affected)
    }

    /// ロックを解放してから結果を返す。解放に失敗した場合は元のエラーを優先する
    async fn finish<T>(
        &self,
        token: &crate::domain::ids::LockToken,
        result: Result<T, DbError>,
    ) -> Result<T, DbError> {
        let released = self.lock.release(token).await;
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_error)) => {
                tracing::error!(lock = %self.lock.name(), error = %release_error, "lock release failed after a failed write");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Database for SingleFileDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn read(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        let current = self.download().await?;
        let sql = sql.to_string();
        let params = params.to_vec();
        blocking(move || {
            let file = materialize(&current)?;
            let conn = Connection::open(file.path())?;
            let rows = query_rows(&conn, &sql, &params)?;
            close(conn)?;
            Ok(rows)
        })
        .await
    }

    async fn write(&self, statements: Vec<Statement>) -> Result<u64, DbError> {
        if statements.is_empty() {
            return Ok(0);
        }
        let count = statements.len();
        let token = self.lock.acquire().await?;
        let result = self.write_locked(statements).await;
        if let Err(e) = &result {
            tracing::warn!(file = %self.file, statements = count, error = %e, "locked write failed");
        }
        self.finish(&token, result).await
    }
}

fn materialize(bytes: &[u8]) -> Result<NamedTempFile, DbError> {
    let mut file = NamedTempFile::new()?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

fn close(conn: Connection) -> Result<(), DbError> {
    conn.close().map_err(|(_, e)| DbError::Sql(e))
}

async fn blocking<T, F>(f: F) -> Result<T, DbError>
where
    F: FnOnce() -> Result<T, DbError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DbError::Join(e.to_string()))?
}

/// 業務スキーマ入りの in-memory DB（他モジュールのテスト用）
#[cfg(test)]
pub(crate) async fn schema_database() -> SingleFileDatabase {
    use crate::impls::blob_lock::LockSettings;
    use crate::ports::{SystemClock, UlidGenerator};
    use std::time::Duration;

    let store: Arc<dyn ObjectStore> = Arc::new(object_store::memory::InMemory::new());
    let lock = BlobLock::new(
        store.clone(),
        Path::from("meshi.sqlite3.lock"),
        LockSettings {
            poll_interval: Duration::from_millis(5),
            ..LockSettings::default()
        },
        Arc::new(UlidGenerator::new(Arc::new(SystemClock))),
    );
    let db = SingleFileDatabase::new(store, Path::from("meshi.sqlite3"), lock);
    if let Err(e) = db.bootstrap(crate::repo::schema::SQLITE_SCHEMA).await {
        panic!("schema bootstrap failed: {e}");
    }
    db
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockMode;
    use crate::impls::blob_lock::LockSettings;
    use crate::ports::{SystemClock, UlidGenerator};
    use object_store::memory::InMemory;
    use std::time::Duration;

    const COUNTER_DDL: &str = "
        CREATE TABLE IF NOT EXISTS counter (id INTEGER PRIMARY KEY, n INTEGER NOT NULL);
        INSERT OR IGNORE INTO counter (id, n) VALUES (1, 0);
        CREATE TABLE IF NOT EXISTS parent (id INTEGER PRIMARY KEY);
        CREATE TABLE IF NOT EXISTS child (id INTEGER PRIMARY KEY, parent_id INTEGER NOT NULL REFERENCES parent(id));
    ";

    fn database(store: Arc<dyn ObjectStore>, max_wait: Duration) -> SingleFileDatabase {
        let lock = BlobLock::new(
            store.clone(),
            Path::from("meshi.sqlite3.lock"),
            LockSettings {
                poll_interval: Duration::from_millis(5),
                max_wait,
                mode: LockMode::Conditional,
            },
            Arc::new(UlidGenerator::new(Arc::new(SystemClock))),
        );
        SingleFileDatabase::new(store, Path::from("meshi.sqlite3"), lock)
    }

    async fn counter(db: &SingleFileDatabase) -> i64 {
        let rows = db.read("SELECT n FROM counter WHERE id = 1", &[]).await.unwrap();
        rows[0].i64("n").unwrap()
    }

    #[tokio::test]
    async fn concurrent_writes_are_serialized() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let db = Arc::new(database(store, Duration::from_secs(30)));
        db.bootstrap(COUNTER_DDL).await.unwrap();

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move {
                    db.write_one("UPDATE counter SET n = n + 1 WHERE id = 1", vec![])
                        .await
                        .unwrap()
                })
            })
            .collect();
        for w in writers {
            assert_eq!(w.await.unwrap(), 1);
        }

        // 失われた更新が無ければ書き込み回数と一致する
        assert_eq!(counter(&db).await, 8);
        assert!(!db.lock().is_held().await.unwrap());
    }

    #[tokio::test]
    async fn failed_sql_releases_the_lock_and_rolls_back() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let db = database(store, Duration::from_secs(5));
        db.bootstrap(COUNTER_DDL).await.unwrap();

        let err = db
            .write(vec![
                Statement::new("UPDATE counter SET n = 100 WHERE id = 1", vec![]),
                Statement::new("UPDATE no_such_table SET n = 1", vec![]),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Sql(_)));
        assert!(!db.lock().is_held().await.unwrap());
        assert_eq!(counter(&db).await, 0);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced_on_write() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let db = database(store, Duration::from_secs(5));
        db.bootstrap(COUNTER_DDL).await.unwrap();

        let err = db
            .write_one(
                "INSERT INTO child (id, parent_id) VALUES (?, ?)",
                vec![SqlValue::Integer(1), SqlValue::Integer(42)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Sql(_)));
        assert!(!db.lock().is_held().await.unwrap());
    }

    #[tokio::test]
    async fn write_times_out_while_someone_else_holds_the_marker() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let db = database(store.clone(), Duration::from_millis(40));
        db.bootstrap(COUNTER_DDL).await.unwrap();
        store
            .put(
                &Path::from("meshi.sqlite3.lock"),
                PutPayload::from_static(b"lock-other"),
            )
            .await
            .unwrap();

        let err = db
            .write_one("UPDATE counter SET n = 5 WHERE id = 1", vec![])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Lock(crate::domain::errors::LockError::Timeout { .. })
        ));

        // 読み取りはロックに関係なく通る
        assert_eq!(counter(&db).await, 0);
    }

    #[tokio::test]
    async fn reads_preserve_integer_and_real() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let db = database(store, Duration::from_secs(5));
        db.bootstrap("CREATE TABLE IF NOT EXISTS v (i INTEGER, r REAL, t TEXT, n TEXT);")
            .await
            .unwrap();
        db.write_one(
            "INSERT INTO v (i, r, t, n) VALUES (?, ?, ?, ?)",
            vec![
                SqlValue::Integer(3),
                SqlValue::Real(3.0),
                SqlValue::from("x"),
                SqlValue::Null,
            ],
        )
        .await
        .unwrap();

        let rows = db.read("SELECT i, r, t, n FROM v", &[]).await.unwrap();
        assert_eq!(rows[0].get("i"), Some(&SqlValue::Integer(3)));
        assert_eq!(rows[0].get("r"), Some(&SqlValue::Real(3.0)));
        assert_eq!(rows[0].get("t"), Some(&SqlValue::from("x")));
        assert_eq!(rows[0].get("n"), Some(&SqlValue::Null));
    }

    #[tokio::test]
    async fn reading_a_missing_file_is_an_error() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let db = database(store, Duration::from_secs(1));
        assert!(matches!(
            db.read("SELECT 1", &[]).await,
            Err(DbError::FileMissing(_))
        ));
    }
}
