//! Database port - リレーショナルストアの抽象化
//!
//! 実装は 2 つ:
//! - **SingleFileDatabase**: blob store 上の SQLite ファイル。読み取りはロックなし、
//!   書き込みはロックマーカーで直列化
//! - **HttpProxyDatabase**: HTTP 越しのリレーショナルプロキシ（MySQL 方言）
//!
//! # 設計原則
//! - `write()` に渡した statement 群は 1 回の呼び出しで適用される
//!   （SingleFileDatabase では 1 トランザクション・1 回のロック取得）
//! - 値は integer / real / text / null を区別したまま往復する

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use crate::domain::errors::DbError;

/// SQL パラメータ・結果セルの値
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    /// JSON（プロキシの応答）から値を作る
    ///
    /// 任意精度の decimal が浮動小数で届くことがあるため、整数値の real は
    /// integer に、それ以外は real に正規化する。
    pub fn from_json(value: &serde_json::Value) -> SqlValue {
        use serde_json::Value;
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    normalize_real(f)
                } else {
                    SqlValue::Text(n.to_string())
                }
            }
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// integer 列も real として読めるようにする
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Integer(i) => Some(*i as f64),
            SqlValue::Real(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

fn normalize_real(f: f64) -> SqlValue {
    const LIMIT: f64 = 9_007_199_254_740_992.0; // 2^53
    if f.is_finite() && f.fract() == 0.0 && f.abs() <= LIMIT {
        SqlValue::Integer(f as i64)
    } else {
        SqlValue::Real(f)
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Integer(i) => serializer.serialize_i64(*i),
            SqlValue::Real(f) => serializer.serialize_f64(*f),
            SqlValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::Integer(i64::from(v))
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(i64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// 結果セルを列名で引ける 1 行
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(BTreeMap<String, SqlValue>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: SqlValue) {
        self.0.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.0.get(column)
    }

    pub fn text(&self, column: &str) -> Result<String, DbError> {
        self.opt_text(column)?.ok_or_else(|| column_error(column, "text"))
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>, DbError> {
        match self.get(column) {
            Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Text(s)) => Ok(Some(s.clone())),
            _ => Err(column_error(column, "text")),
        }
    }

    pub fn i64(&self, column: &str) -> Result<i64, DbError> {
        self.get(column)
            .and_then(SqlValue::as_i64)
            .ok_or_else(|| column_error(column, "integer"))
    }

    pub fn f64(&self, column: &str) -> Result<f64, DbError> {
        self.get(column)
            .and_then(SqlValue::as_f64)
            .ok_or_else(|| column_error(column, "real"))
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        Row(iter.into_iter().collect())
    }
}

fn column_error(column: &str, expected: &'static str) -> DbError {
    DbError::Column {
        column: column.to_string(),
        expected,
    }
}

/// 1 文の SQL と位置パラメータ（`?`）
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// 方言差のうち repository が気にする部分だけ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

impl Dialect {
    /// 既存行があれば何もしない INSERT の先頭
    pub fn insert_ignore(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "INSERT OR IGNORE",
            Dialect::MySql => "INSERT IGNORE",
        }
    }

    /// 衝突時に `update_columns` を新しい値で上書きする句
    pub fn upsert_clause(&self, conflict_columns: &[&str], update_columns: &[&str]) -> String {
        match self {
            Dialect::Sqlite => {
                let sets: Vec<String> = update_columns
                    .iter()
                    .map(|c| format!("{c} = excluded.{c}"))
                    .collect();
                format!(
                    "ON CONFLICT({}) DO UPDATE SET {}",
                    conflict_columns.join(", "),
                    sets.join(", ")
                )
            }
            Dialect::MySql => {
                let sets: Vec<String> = update_columns
                    .iter()
                    .map(|c| format!("{c} = VALUES({c})"))
                    .collect();
                format!("ON DUPLICATE KEY UPDATE {}", sets.join(", "))
            }
        }
    }
}

/// `(?, ?, ?)` を `rows` 個並べた VALUES 句の本体
pub fn placeholders(columns: usize, rows: usize) -> String {
    let row = format!("({})", vec!["?"; columns].join(", "));
    vec![row; rows].join(", ")
}

#[async_trait]
pub trait Database: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// ロックを取らずに読む。直近にアップロードされた版を見る
    async fn read(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError>;

    /// 書き込み。戻り値は影響行数の合計
    async fn write(&self, statements: Vec<Statement>) -> Result<u64, DbError>;

    async fn write_one(&self, sql: &str, params: Vec<SqlValue>) -> Result<u64, DbError> {
        self.write(vec![Statement::new(sql, params)]).await
    }
}
