use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Значение по умолчанию для отсутствующих ячеек
pub const ABSENT_VALUE: &str = "Отсутствует";

/// Товар из загруженной спецификации
///
/// `article` — детерминированный 10-значный код, вычисленный из
/// (name, model, tariff_code); служит естественным ключом дедупликации.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub model: String,
    pub brand: String,
    pub tariff_code: String,
    pub article: String,
    pub uploaded_at: DateTime<Utc>,
}

impl Product {
    pub fn new(
        name: String,
        model: String,
        brand: String,
        tariff_code: String,
        article: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            model,
            brand,
            tariff_code,
            article,
            uploaded_at: Utc::now(),
        }
    }
}

/// Страница списка товаров
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductsPage {
    pub items: Vec<Product>,
    pub page: u64,
    pub total_pages: u64,
    pub total_count: u64,
}

/// Итог обработки загруженного файла
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSummary {
    pub extracted: usize,
    pub inserted: usize,
}
