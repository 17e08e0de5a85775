use std::collections::HashMap;
use std::sync::Arc;

use arena_core::Task;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// 任务注册表，由任务管理器持有，按任务ID查找实现
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<String, Arc<dyn Task>>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册任务，同ID的旧实现会被替换并返回
    pub async fn register(&self, task: Arc<dyn Task>) -> Option<Arc<dyn Task>> {
        let id = task.id().to_string();
        let previous = self.tasks.write().await.insert(id.clone(), task);
        if previous.is_some() {
            warn!("任务{}已注册，使用新的实现替换", id);
        } else {
            info!("Registered task: {}", id);
        }
        previous
    }

    #[cfg(test)]
    pub async fn unregister(&self, id: &str) -> Option<Arc<dyn Task>> {
        self.tasks.write().await.remove(id)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn Task>> {
        self.tasks.read().await.get(id).cloned()
    }

    #[cfg(test)]
    pub async fn contains(&self, id: &str) -> bool {
        self.tasks.read().await.contains_key(id)
    }

    /// 已注册的任务ID，按字母排序
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tasks.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    #[cfg(test)]
    pub async fn count(&self) -> usize {
        self.tasks.read().await.len()
    }
}
