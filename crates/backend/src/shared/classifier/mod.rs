pub mod qwen_client;
pub mod types;

pub use qwen_client::QwenVlClient;
pub use types::{ClassifierError, ImageClassifier};

use once_cell::sync::OnceCell;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Общий на процесс пул разрешений для запросов к сервису распознавания.
/// Все одновременные загрузки конкурируют за одни и те же слоты — это
/// ограничитель нагрузки на внешний сервис.
static PERMIT_POOL: OnceCell<Arc<Semaphore>> = OnceCell::new();

pub fn init_permit_pool(capacity: usize) -> anyhow::Result<()> {
    PERMIT_POOL
        .set(Arc::new(Semaphore::new(capacity)))
        .map_err(|_| anyhow::anyhow!("Permit pool already initialized"))
}

pub fn get_permit_pool() -> Arc<Semaphore> {
    PERMIT_POOL
        .get()
        .expect("Permit pool has not been initialized")
        .clone()
}
