use async_trait::async_trait;
use thiserror::Error;

/// Ошибки сервиса распознавания изображений
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Распознавание кода ТН ВЭД по фотографии товара
///
/// Trait-шов нужен, чтобы конвейер можно было тестировать без внешнего
/// сервиса; продакшен-реализация — [`super::QwenVlClient`].
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// Вернуть код для одной картинки; любая ошибка изолируется на
    /// уровне вызывающего и не роняет остальные задачи
    async fn classify_image(
        &self,
        image: &[u8],
        extension: &str,
    ) -> Result<String, ClassifierError>;

    fn provider_name(&self) -> &str;
}
