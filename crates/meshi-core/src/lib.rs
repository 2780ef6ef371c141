//! meshi-core
//!
//! 飲食店掲載サイトを定期的にスクレイピングし、単一ファイル DB に貯めて
//! 地理検索 API で返すための部品です。
//!
//! # モジュール構成
//! - **domain**: I/O を持たない型（task, payload, outcome, area, restaurant, errors）
//! - **ports**: 外部システムの trait（Database, TaskStore, ScheduleBackend, ListingSite, ...）
//! - **impls**: ports の実装（object_store, SQLite, HTTP, in-memory）
//! - **typed**: 型付き Task API（Task trait, Handler trait, TypedRegistry）
//! - **app**: driver, スケジュール, invocation 境界, runner, builder, handlers
//! - **repo**: 業務 SQL
//! - **api**: 読み取り API（axum）

pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod geo;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod repo;
pub mod typed;
