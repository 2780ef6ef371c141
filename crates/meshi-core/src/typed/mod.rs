//! Typed - 型付き Task API
//!
//! kind ごとの payload 型と handler の対応を型で固定します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Task` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure

pub mod handler;
pub mod registry;
pub mod task;

pub use self::handler::{DynHandler, Handler, TypedHandler};
pub use self::registry::{RegistryError, TypedRegistry};
pub use self::task::Task;
