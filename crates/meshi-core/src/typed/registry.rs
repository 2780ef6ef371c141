//! TypedRegistry - kind から handler を引く
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Generic methods での登録と型安全性
//! - Arc による共有所有権

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::task::Task;
use crate::domain::task::TaskKind;

/// 型付き handler の登録簿
///
/// # 使用例
/// ```ignore
/// let mut registry = TypedRegistry::new();
/// registry.register::<ScrapingDetail, _>(DetailHandler::new(deps))?;
/// let handler = registry.get(TaskKind::ScrapingDetail);
/// ```
#[derive(Default)]
pub struct TypedRegistry {
    handlers: HashMap<TaskKind, Arc<dyn DynHandler>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("handler for task kind '{0}' is already registered")]
    AlreadyRegistered(TaskKind),
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        if self.handlers.contains_key(&T::KIND) {
            return Err(RegistryError::AlreadyRegistered(T::KIND));
        }
        self.handlers
            .insert(T::KIND, Arc::new(TypedHandler::<T, H>::new(handler)));
        Ok(())
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(&kind).cloned()
    }

    /// 登録済みの kind（順序は `TaskKind` の定義順）
    pub fn registered_kinds(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<TaskKind> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}
