//! 店舗レコードの読み書き
//!
//! # 書き込み
//! - abstract フェーズ: 一覧の (id, name, サムネイル有無) とエリア系譜を upsert。
//!   detail で埋めた列と `is_complete` には触らない
//! - detail フェーズ: ジャンル・住所・座標・営業時間を埋めて `is_complete = 1`、
//!   画像行を差し替える。1 回の `write()` にまとめる
//!
//! # 読み取り
//! - 地理検索は `is_complete = 1` の行だけ。距離は取得後に Rust 側で計算して並べる
//!   （どちらの DB でも同じ順序になる）

use crate::domain::area::AreaPath;
use crate::domain::errors::DbError;
use crate::domain::restaurant::{
    ImageRef, ImageSummary, ListingEntry, NewRestaurant, RestaurantDetail, SearchHit,
};
use crate::geo::{BoundingBox, LatLng, distance_km};
use crate::ports::database::{Database, Dialect, SqlValue, Statement, placeholders};

/// 検索結果の上限
pub const SEARCH_LIMIT: usize = 2000;

const CHUNK: usize = 200;

/// detail フェーズで確定した値
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedDetail {
    pub genre_code: String,
    pub sub_genre_code: Option<String>,
    pub address: String,
    pub location: LatLng,
    pub open_hours: String,
    pub close_days: String,
    pub parking: String,
    pub images: Vec<ImageRef>,
}

pub fn abstract_statements(
    dialect: Dialect,
    area: &AreaPath,
    entries: &[ListingEntry],
) -> Vec<Statement> {
    const COLUMNS: [&str; 6] = [
        "id",
        "name",
        "is_thumbnail",
        "service_area_code",
        "middle_area_code",
        "small_area_code",
    ];
    let upsert = dialect.upsert_clause(&["id"], &COLUMNS[1..]);
    entries
        .chunks(CHUNK)
        .map(|chunk| {
            let mut params = Vec::with_capacity(chunk.len() * COLUMNS.len());
            for entry in chunk {
                params.push(SqlValue::from(&entry.id));
                params.push(SqlValue::from(&entry.name));
                params.push(SqlValue::from(entry.thumbnail_url.is_some()));
                params.push(SqlValue::from(&area.service_area_code));
                params.push(SqlValue::from(&area.middle_area_code));
                params.push(SqlValue::from(&area.small_area_code));
            }
            let sql = format!(
                "INSERT INTO restaurants ({}) VALUES {} {upsert}",
                COLUMNS.join(", "),
                placeholders(COLUMNS.len(), chunk.len())
            );
            Statement::new(sql, params)
        })
        .collect()
}

pub async fn save_abstracts(
    db: &dyn Database,
    area: &AreaPath,
    entries: &[ListingEntry],
) -> Result<u64, DbError> {
    if entries.is_empty() {
        return Ok(0);
    }
    db.write(abstract_statements(db.dialect(), area, entries))
        .await
}

pub fn detail_statements(dialect: Dialect, id: &str, detail: &CompletedDetail) -> Vec<Statement> {
    let mut statements = vec![Statement::new(
        "UPDATE restaurants SET genre_code = ?, sub_genre_code = ?, address = ?, \
         latitude = ?, longitude = ?, open_hours = ?, close_days = ?, parking = ?, \
         is_complete = 1 WHERE id = ?",
        vec![
            SqlValue::from(&detail.genre_code),
            SqlValue::from(detail.sub_genre_code.clone()),
            SqlValue::from(&detail.address),
            SqlValue::from(detail.location.lat),
            SqlValue::from(detail.location.lng),
            SqlValue::from(&detail.open_hours),
            SqlValue::from(&detail.close_days),
            SqlValue::from(&detail.parking),
            SqlValue::from(id),
        ],
    )];

    // 前回より枚数が減った分を消す
    statements.push(Statement::new(
        "DELETE FROM images WHERE id = ? AND order_num > ?",
        vec![SqlValue::from(id), SqlValue::Integer(detail.images.len() as i64)],
    ));

    if !detail.images.is_empty() {
        let mut params = Vec::with_capacity(detail.images.len() * 3);
        for (i, image) in detail.images.iter().enumerate() {
            params.push(SqlValue::from(id));
            params.push(SqlValue::Integer(i as i64 + 1));
            params.push(SqlValue::from(&image.alt));
        }
        statements.push(Statement::new(
            format!(
                "INSERT INTO images (id, order_num, name) VALUES {} {}",
                placeholders(3, detail.images.len()),
                dialect.upsert_clause(&["id", "order_num"], &["name"])
            ),
            params,
        ));
    }
    statements
}

/// 戻り値は更新した店舗行の数（0 なら abstract フェーズの行が無い）
pub async fn complete_detail(
    db: &dyn Database,
    id: &str,
    detail: &CompletedDetail,
) -> Result<u64, DbError> {
    let exists = db
        .read("SELECT id FROM restaurants WHERE id = ?", &[id.into()])
        .await?;
    if exists.is_empty() {
        return Ok(0);
    }
    db.write(detail_statements(db.dialect(), id, detail)).await?;
    Ok(1)
}

/// 矩形内の完成済み店舗。`reference` があれば近い順、無ければ id 順
pub async fn search(
    db: &dyn Database,
    bbox: BoundingBox,
    reference: Option<LatLng>,
    middle_area_code: Option<&str>,
) -> Result<Vec<SearchHit>, DbError> {
    let bbox = bbox.normalized();
    let mut sql = String::from(
        "SELECT r.id, r.name, r.latitude, r.longitude, g.name AS genre_name, r.parking, r.is_thumbnail \
         FROM restaurants r INNER JOIN genre_master g ON r.genre_code = g.code \
         WHERE r.is_complete = 1 AND r.latitude BETWEEN ? AND ? AND r.longitude BETWEEN ? AND ?",
    );
    let mut params = vec![
        SqlValue::from(bbox.lat_min),
        SqlValue::from(bbox.lat_max),
        SqlValue::from(bbox.lng_min),
        SqlValue::from(bbox.lng_max),
    ];
    if let Some(code) = middle_area_code {
        sql.push_str(" AND r.middle_area_code = ?");
        params.push(code.into());
    }
    sql.push_str(" ORDER BY r.id");
    // 距離順は全件を見ないと決まらない
    if reference.is_none() {
        sql.push_str(&format!(" LIMIT {SEARCH_LIMIT}"));
    }

    let rows = db.read(&sql, &params).await?;
    let mut hits = Vec::with_capacity(rows.len().min(SEARCH_LIMIT));
    for row in &rows {
        let position = LatLng::new(row.f64("latitude")?, row.f64("longitude")?);
        hits.push(SearchHit {
            id: row.text("id")?,
            name: row.text("name")?,
            latitude: position.lat,
            longitude: position.lng,
            genre_name: row.text("genre_name")?,
            parking: row.opt_text("parking")?.unwrap_or_default(),
            is_thumbnail: row.i64("is_thumbnail")?,
            distance: reference.map(|from| distance_km(from, position)),
        });
    }
    if reference.is_some() {
        // 同じ距離なら id 順（取得順）のまま
        hits.sort_by(|a, b| a.distance.unwrap_or(0.0).total_cmp(&b.distance.unwrap_or(0.0)));
        hits.truncate(SEARCH_LIMIT);
    }
    Ok(hits)
}

/// 完成済みの店舗 1 件と画像（order_num 順）
pub async fn detail(db: &dyn Database, id: &str) -> Result<Option<RestaurantDetail>, DbError> {
    let rows = db
        .read(
            "SELECT r.name, g1.name AS genre, g2.name AS sub_genre, r.address, \
             r.latitude, r.longitude, r.open_hours, r.close_days, r.parking, \
             i.order_num, i.name AS alt \
             FROM restaurants r \
             INNER JOIN genre_master g1 ON r.genre_code = g1.code \
             LEFT JOIN genre_master g2 ON r.sub_genre_code = g2.code \
             LEFT JOIN images i ON i.id = r.id \
             WHERE r.id = ? AND r.is_complete = 1 \
             ORDER BY i.order_num ASC",
            &[id.into()],
        )
        .await?;
    let Some(first) = rows.first() else {
        return Ok(None);
    };

    let mut images = Vec::new();
    for row in &rows {
        // 画像が無いと LEFT JOIN の列は NULL
        if row.get("order_num").is_none_or(SqlValue::is_null) {
            continue;
        }
        images.push(ImageSummary {
            order_num: row.i64("order_num")?,
            alt: row.opt_text("alt")?.unwrap_or_default(),
        });
    }

    Ok(Some(RestaurantDetail {
        name: first.text("name")?,
        genre: first.text("genre")?,
        sub_genre: first.opt_text("sub_genre")?,
        address: first.opt_text("address")?.unwrap_or_default(),
        latitude: first.f64("latitude")?,
        longitude: first.f64("longitude")?,
        open_hours: first.opt_text("open_hours")?.unwrap_or_default(),
        close_days: first.opt_text("close_days")?.unwrap_or_default(),
        parking: first.opt_text("parking")?.unwrap_or_default(),
        images,
    }))
}

/// 完成済みで未通知の店舗（id 順）
pub async fn unnotified(db: &dyn Database) -> Result<Vec<NewRestaurant>, DbError> {
    let rows = db
        .read(
            "SELECT r.id, r.name, g1.name AS genre_name, g2.name AS sub_genre_name, r.address \
             FROM restaurants r \
             INNER JOIN genre_master g1 ON r.genre_code = g1.code \
             LEFT JOIN genre_master g2 ON r.sub_genre_code = g2.code \
             WHERE r.is_complete = 1 AND r.is_notified = 0 \
             ORDER BY r.id",
            &[],
        )
        .await?;
    rows.iter()
        .map(|row| {
            Ok(NewRestaurant {
                id: row.text("id")?,
                name: row.text("name")?,
                genre_name: row.text("genre_name")?,
                sub_genre_name: row.opt_text("sub_genre_name")?,
                address: row.opt_text("address")?.unwrap_or_default(),
            })
        })
        .collect()
}

/// `ids` をまとめて通知済みにする（1 回の `write()`）
pub async fn mark_notified(db: &dyn Database, ids: &[String]) -> Result<u64, DbError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let statements = ids
        .chunks(CHUNK)
        .map(|chunk| {
            let marks = vec!["?"; chunk.len()].join(", ");
            Statement::new(
                format!("UPDATE restaurants SET is_notified = 1 WHERE id IN ({marks})"),
                chunk.iter().map(SqlValue::from).collect(),
            )
        })
        .collect();
    db.write(statements).await
}
