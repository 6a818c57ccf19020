use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use contracts::domain::a001_product::{Product, ProductsPage};
use rust_xlsxwriter::Workbook;
use serde::Deserialize;

use crate::domain::a001_product::service;

#[derive(Deserialize)]
pub struct ProductsQuery {
    #[serde(default = "default_page")]
    pub page: u64,
}

fn default_page() -> u64 {
    1
}

/// GET /api/products?page=N
pub async fn list(Query(query): Query<ProductsQuery>) -> Result<Json<ProductsPage>, StatusCode> {
    match service::list_page(query.page).await {
        Ok(page) => Ok(Json(page)),
        Err(e) => {
            tracing::error!("Failed to list products: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/products/download
///
/// Выгрузка всех сохранённых товаров одним xlsx-файлом.
pub async fn download() -> Result<Response, (StatusCode, String)> {
    let products = service::list_all_ordered().await.map_err(|e| {
        tracing::error!("Failed to load products for export: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Ошибка чтения товаров".to_string(),
        )
    })?;

    let bytes = build_export_workbook(&products).map_err(|e| {
        tracing::error!("Failed to build export workbook: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Ошибка формирования файла".to_string(),
        )
    })?;

    let filename = format!("Товары_{}.xlsx", Utc::now().format("%d%m%Y_%H%M"));
    Ok(super::xlsx_attachment(&filename, bytes))
}

const EXPORT_HEADERS: [&str; 7] = [
    "№",
    "Наименование",
    "Модель",
    "Бренд",
    "Код ТН ВЭД",
    "Артикул",
    "Дата создания",
];

fn build_export_workbook(products: &[Product]) -> anyhow::Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Товары")?;

    for (col, title) in EXPORT_HEADERS.iter().enumerate() {
        worksheet.write_string(0, col as u16, *title)?;
    }

    for (idx, product) in products.iter().enumerate() {
        let row = idx as u32 + 1;
        worksheet.write_number(row, 0, (idx + 1) as f64)?;
        worksheet.write_string(row, 1, product.name.as_str())?;
        worksheet.write_string(row, 2, product.model.as_str())?;
        worksheet.write_string(row, 3, product.brand.as_str())?;
        worksheet.write_string(row, 4, product.tariff_code.as_str())?;
        worksheet.write_string(row, 5, product.article.as_str())?;
        worksheet.write_string(
            row,
            6,
            product.uploaded_at.format("%d.%m.%Y %H:%M").to_string(),
        )?;
    }

    let bytes = workbook.save_to_buffer()?;
    Ok(bytes)
}
