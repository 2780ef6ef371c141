//! HttpProxyDatabase - HTTP 越しのリレーショナルプロキシ
//!
//! リクエストは 1 文ごとに `POST {url}`:
//!
//! ```json
//! {"sql": "...", "params": [...], "is_select": 1}
//! ```
//!
//! ヘッダは `Env` と `X-Api-Key`。select の応答は `{"data": [{列: 値}, ...]}`。
//! placeholder は SQLite と同じ `?` のまま送る。
//! 200 以外は応答本文をそのまま `DbError::Proxy` に入れて返す。
//!
//! # 数値の扱い
//! プロキシは decimal 列を JSON の浮動小数で返すことがある。
//! `SqlValue::from_json` で整数値は integer、それ以外は real に揃える。
//!
//! # 制約
//! プロキシ側にトランザクション API は無いので、`write()` の statement 群は
//! 順番に送るだけ（途中で失敗したら前の文は適用済み）。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::domain::errors::DbError;
use crate::ports::database::{Database, Dialect, Row, SqlValue, Statement};
use crate::ports::SecretSource;

#[derive(Debug, Serialize)]
struct ProxyRequest<'a> {
    sql: &'a str,
    params: &'a [SqlValue],
    is_select: u8,
}

pub struct HttpProxyDatabase {
    client: reqwest::Client,
    url: String,
    env: String,
    api_key: Arc<dyn SecretSource>,
}

impl HttpProxyDatabase {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        env: impl Into<String>,
        api_key: Arc<dyn SecretSource>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            env: env.into(),
            api_key,
        }
    }

    async fn post(&self, sql: &str, params: &[SqlValue], is_select: bool) -> Result<Value, DbError> {
        let key = self.api_key.fetch().await?;
        let body = ProxyRequest {
            sql,
            params,
            is_select: u8::from(is_select),
        };
        let response = self
            .client
            .post(&self.url)
            .header("Env", &self.env)
            .header("X-Api-Key", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DbError::Http(Box::new(e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DbError::Http(Box::new(e)))?;
        if status != reqwest::StatusCode::OK {
            return Err(DbError::Proxy {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| DbError::Decode(e.to_string()))
    }
}

/// `{"data": [...]}` を行に変換する
fn rows_from_response(body: &Value) -> Result<Vec<Row>, DbError> {
    let data = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| DbError::Decode("select response has no `data` array".to_string()))?;
    data.iter()
        .map(|record| {
            let object = record
                .as_object()
                .ok_or_else(|| DbError::Decode(format!("row is not an object: {record}")))?;
            Ok(object
                .iter()
                .map(|(column, value)| (column.clone(), SqlValue::from_json(value)))
                .collect())
        })
        .collect()
}

/// 書き込み応答の影響行数。プロキシが返さない場合は 0
fn affected_from_response(body: &Value) -> u64 {
    ["affected_rows", "rowcount"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_u64))
        .unwrap_or(0)
}

#[async_trait]
impl Database for HttpProxyDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn read(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        let body = self.post(sql, params, true).await?;
        rows_from_response(&body)
    }

    async fn write(&self, statements: Vec<Statement>) -> Result<u64, DbError> {
        let mut affected = 0;
        for statement in &statements {
            let body = self.post(&statement.sql, &statement.params, false).await?;
            affected += affected_from_response(&body);
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::secret::StaticSecret;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn database(server: &MockServer) -> HttpProxyDatabase {
        HttpProxyDatabase::new(
            reqwest::Client::new(),
            server.uri(),
            "stg",
            Arc::new(StaticSecret::new("secret-key")),
        )
    }

    #[tokio::test]
    async fn select_sends_headers_and_normalizes_numbers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Env", "stg"))
            .and(header("X-Api-Key", "secret-key"))
            .and(body_partial_json(json!({
                "sql": "SELECT * FROM restaurants WHERE id = ?",
                "is_select": 1,
                "params": ["J001"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "J001", "is_thumbnail": 1.0, "latitude": 35.5, "parking": null}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rows = database(&server)
            .read("SELECT * FROM restaurants WHERE id = ?", &[SqlValue::from("J001")])
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("is_thumbnail"), Some(&SqlValue::Integer(1)));
        assert_eq!(rows[0].get("latitude"), Some(&SqlValue::Real(35.5)));
        assert_eq!(rows[0].get("parking"), Some(&SqlValue::Null));
    }

    #[tokio::test]
    async fn non_200_carries_the_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("deadlock found"))
            .mount(&server)
            .await;

        let err = database(&server)
            .write_one("UPDATE restaurants SET is_notified = 1", vec![])
            .await
            .unwrap_err();
        match err {
            DbError::Proxy { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "deadlock found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn writes_are_sent_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"is_select": 0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"affected_rows": 2})))
            .expect(2)
            .mount(&server)
            .await;

        let affected = database(&server)
            .write(vec![
                Statement::new("DELETE FROM images WHERE id = ?", vec!["J1".into()]),
                Statement::new("DELETE FROM images WHERE id = ?", vec!["J2".into()]),
            ])
            .await
            .unwrap();
        assert_eq!(affected, 4);
    }

    #[test]
    fn missing_data_array_is_a_decode_error() {
        assert!(matches!(
            rows_from_response(&json!({"rows": []})),
            Err(DbError::Decode(_))
        ));
    }
}
