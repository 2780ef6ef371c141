//! 単一ファイル DB のスキーマ
//!
//! すべて `IF NOT EXISTS` なので `init-db` は何度流してもよい。
//! プロキシ側（MySQL）のスキーマは別管理。

pub const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS update_tasks (
    kind        TEXT    NOT NULL,
    param       TEXT    NOT NULL,
    payload     TEXT    NOT NULL,
    created_at  INTEGER NOT NULL,
    PRIMARY KEY (kind, param)
);
CREATE INDEX IF NOT EXISTS update_tasks_fetch ON update_tasks (kind, created_at, param);

CREATE TABLE IF NOT EXISTS large_service_area_master (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS service_area_master (
    code        TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    parent_code TEXT
);
CREATE TABLE IF NOT EXISTS large_area_master (
    code        TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    parent_code TEXT
);
CREATE TABLE IF NOT EXISTS middle_area_master (
    code        TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    parent_code TEXT
);
CREATE TABLE IF NOT EXISTS small_area_master (
    code        TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    parent_code TEXT
);

CREATE TABLE IF NOT EXISTS genre_master (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS restaurants (
    id                TEXT PRIMARY KEY,
    name              TEXT    NOT NULL,
    genre_code        TEXT,
    sub_genre_code    TEXT,
    address           TEXT,
    latitude          REAL,
    longitude         REAL,
    open_hours        TEXT,
    close_days        TEXT,
    parking           TEXT,
    is_thumbnail      INTEGER NOT NULL DEFAULT 0,
    is_complete       INTEGER NOT NULL DEFAULT 0,
    is_notified       INTEGER NOT NULL DEFAULT 0,
    service_area_code TEXT,
    middle_area_code  TEXT,
    small_area_code   TEXT
);
CREATE INDEX IF NOT EXISTS restaurants_geo ON restaurants (is_complete, latitude, longitude);

CREATE TABLE IF NOT EXISTS images (
    id        TEXT    NOT NULL REFERENCES restaurants (id) ON DELETE CASCADE,
    order_num INTEGER NOT NULL,
    name      TEXT,
    PRIMARY KEY (id, order_num)
);
"#;
