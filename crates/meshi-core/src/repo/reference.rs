//! 参照データ（エリア・ジャンルのマスタ）
//!
//! 取り込みは `{code, name, parent_code}` の組を upsert するだけです。
//! エリアは 大サービスエリア > サービスエリア > 大エリア > 中エリア > 小エリア の
//! 親子関係を `parent_code` で持ちます。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::area::AreaPath;
use crate::domain::errors::{DbError, ValidationError};
use crate::ports::database::{Database, Dialect, Row, SqlValue, Statement, placeholders};

/// 1 文あたりの行数
const CHUNK: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasterTable {
    LargeServiceArea,
    ServiceArea,
    LargeArea,
    MiddleArea,
    SmallArea,
    Genre,
}

impl MasterTable {
    pub const ALL: [MasterTable; 6] = [
        MasterTable::LargeServiceArea,
        MasterTable::ServiceArea,
        MasterTable::LargeArea,
        MasterTable::MiddleArea,
        MasterTable::SmallArea,
        MasterTable::Genre,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MasterTable::LargeServiceArea => "large_service_area",
            MasterTable::ServiceArea => "service_area",
            MasterTable::LargeArea => "large_area",
            MasterTable::MiddleArea => "middle_area",
            MasterTable::SmallArea => "small_area",
            MasterTable::Genre => "genre",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            MasterTable::LargeServiceArea => "large_service_area_master",
            MasterTable::ServiceArea => "service_area_master",
            MasterTable::LargeArea => "large_area_master",
            MasterTable::MiddleArea => "middle_area_master",
            MasterTable::SmallArea => "small_area_master",
            MasterTable::Genre => "genre_master",
        }
    }

    /// 最上位のエリアとジャンルには親が無い
    pub fn has_parent(&self) -> bool {
        !matches!(self, MasterTable::LargeServiceArea | MasterTable::Genre)
    }
}

impl fmt::Display for MasterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MasterTable {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MasterTable::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::field("table", s))
    }
}

/// 取り込み 1 行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MasterRow {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub parent_code: Option<String>,
}

/// upsert 文を組み立てる。親を持たない表では `parent_code` を無視する
pub fn upsert_statements(dialect: Dialect, table: MasterTable, rows: &[MasterRow]) -> Vec<Statement> {
    let (columns, updates): (&[&str], &[&str]) = if table.has_parent() {
        (&["code", "name", "parent_code"], &["name", "parent_code"])
    } else {
        (&["code", "name"], &["name"])
    };
    let upsert = dialect.upsert_clause(&["code"], updates);

    rows.chunks(CHUNK)
        .map(|chunk| {
            let mut params = Vec::with_capacity(chunk.len() * columns.len());
            for row in chunk {
                params.push(SqlValue::from(&row.code));
                params.push(SqlValue::from(&row.name));
                if table.has_parent() {
                    params.push(SqlValue::from(row.parent_code.clone()));
                }
            }
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {} {upsert}",
                table.table(),
                columns.join(", "),
                placeholders(columns.len(), chunk.len()),
            );
            Statement::new(sql, params)
        })
        .collect()
}

pub async fn upsert(db: &dyn Database, table: MasterTable, rows: &[MasterRow]) -> Result<u64, DbError> {
    if rows.is_empty() {
        return Ok(0);
    }
    let affected = db.write(upsert_statements(db.dialect(), table, rows)).await?;
    tracing::info!(%table, rows = rows.len(), affected, "reference data upserted");
    Ok(affected)
}

/// ジャンル名からコードを引く
pub async fn genre_code(db: &dyn Database, name: &str) -> Result<Option<String>, DbError> {
    let rows = db
        .read("SELECT code FROM genre_master WHERE name = ?", &[name.into()])
        .await?;
    rows.first().map(|row| row.text("code")).transpose()
}

/// code -> name
pub async fn genre_names(db: &dyn Database) -> Result<HashMap<String, String>, DbError> {
    let rows = db.read("SELECT code, name FROM genre_master", &[]).await?;
    rows.iter()
        .map(|row| -> Result<(String, String), DbError> { Ok((row.text("code")?, row.text("name")?)) })
        .collect()
}

const AREA_PATH_SQL: &str = "SELECT \
    ls.code AS large_service_area_code, ls.name AS large_service_area_name, \
    sa.code AS service_area_code, sa.name AS service_area_name, \
    la.code AS large_area_code, la.name AS large_area_name, \
    ma.code AS middle_area_code, ma.name AS middle_area_name, \
    xa.code AS small_area_code, xa.name AS small_area_name \
    FROM small_area_master xa \
    INNER JOIN middle_area_master ma ON xa.parent_code = ma.code \
    INNER JOIN large_area_master la ON ma.parent_code = la.code \
    INNER JOIN service_area_master sa ON la.parent_code = sa.code \
    INNER JOIN large_service_area_master ls ON sa.parent_code = ls.code";

fn area_path_from_row(row: &Row) -> Result<AreaPath, DbError> {
    Ok(AreaPath {
        large_service_area_code: row.text("large_service_area_code")?,
        large_service_area_name: row.text("large_service_area_name")?,
        service_area_code: row.text("service_area_code")?,
        service_area_name: row.text("service_area_name")?,
        large_area_code: row.text("large_area_code")?,
        large_area_name: row.text("large_area_name")?,
        middle_area_code: row.text("middle_area_code")?,
        middle_area_name: row.text("middle_area_name")?,
        small_area_code: row.text("small_area_code")?,
        small_area_name: row.text("small_area_name")?,
    })
}

/// 小エリアコードから系譜をたどる。どこかで親が欠けていれば None
pub async fn area_path(db: &dyn Database, small_area_code: &str) -> Result<Option<AreaPath>, DbError> {
    let sql = format!("{AREA_PATH_SQL} WHERE xa.code = ?");
    let rows = db.read(&sql, &[small_area_code.into()]).await?;
    rows.first().map(area_path_from_row).transpose()
}

/// 中エリア配下（None なら全件）の小エリア系譜を code 順で
pub async fn area_paths(db: &dyn Database, middle_area_code: Option<&str>) -> Result<Vec<AreaPath>, DbError> {
    let (sql, params) = match middle_area_code {
        Some(code) => (
            format!("{AREA_PATH_SQL} WHERE ma.code = ? ORDER BY xa.code"),
            vec![SqlValue::from(code)],
        ),
        None => (format!("{AREA_PATH_SQL} ORDER BY xa.code"), Vec::new()),
    };
    let rows = db.read(&sql, &params).await?;
    rows.iter().map(area_path_from_row).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::area::sample_area;
    use crate::impls::single_file_db::schema_database;

    fn row(code: &str, name: &str, parent: Option<&str>) -> MasterRow {
        MasterRow {
            code: code.to_string(),
            name: name.to_string(),
            parent_code: parent.map(str::to_string),
        }
    }

    /// sample_area() の系譜とジャンルを入れる
    pub(crate) async fn seed_reference(db: &dyn Database) {
        let a = sample_area();
        let seeds = [
            (MasterTable::LargeServiceArea, vec![row(&a.large_service_area_code, &a.large_service_area_name, None)]),
            (MasterTable::ServiceArea, vec![row(&a.service_area_code, &a.service_area_name, Some(&a.large_service_area_code))]),
            (MasterTable::LargeArea, vec![row(&a.large_area_code, &a.large_area_name, Some(&a.service_area_code))]),
            (MasterTable::MiddleArea, vec![row(&a.middle_area_code, &a.middle_area_name, Some(&a.large_area_code))]),
            (MasterTable::SmallArea, vec![
                row(&a.small_area_code, &a.small_area_name, Some(&a.middle_area_code)),
                row("X999", "どこにも属さない", Some("Y999")),
            ]),
            (MasterTable::Genre, vec![
                row("G001", "居酒屋", None),
                row("G004", "和食", None),
                row("G013", "ラーメン", None),
            ]),
        ];
        for (table, rows) in seeds {
            upsert(db, table, &rows).await.unwrap();
        }
    }

    #[test]
    fn table_names_parse() {
        assert_eq!("middle_area".parse::<MasterTable>().unwrap(), MasterTable::MiddleArea);
        assert!("prefecture".parse::<MasterTable>().is_err());
    }

    #[test]
    fn parentless_tables_skip_the_parent_column() {
        let rows = vec![row("G001", "居酒屋", Some("ignored"))];
        let statements = upsert_statements(Dialect::MySql, MasterTable::Genre, &rows);
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].sql,
            "INSERT INTO genre_master (code, name) VALUES (?, ?) ON DUPLICATE KEY UPDATE name = VALUES(name)"
        );
        assert_eq!(statements[0].params.len(), 2);
    }

    #[tokio::test]
    async fn upsert_overwrites_names() {
        let db = schema_database().await;
        upsert(&db, MasterTable::Genre, &[row("G001", "居酒屋", None)]).await.unwrap();
        upsert(&db, MasterTable::Genre, &[row("G001", "居酒屋・バー", None)]).await.unwrap();

        assert_eq!(genre_code(&db, "居酒屋・バー").await.unwrap().as_deref(), Some("G001"));
        assert_eq!(genre_code(&db, "居酒屋").await.unwrap(), None);
        assert_eq!(genre_names(&db).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn area_path_follows_the_parents() {
        let db = schema_database().await;
        seed_reference(&db).await;

        assert_eq!(area_path(&db, "X005").await.unwrap(), Some(sample_area()));
        // 中エリアが無いので系譜が切れている
        assert_eq!(area_path(&db, "X999").await.unwrap(), None);
        assert_eq!(area_paths(&db, Some("Y005")).await.unwrap(), vec![sample_area()]);
        assert_eq!(area_paths(&db, None).await.unwrap().len(), 1);
    }
}
