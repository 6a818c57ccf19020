use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::response::Response;
use contracts::domain::a001_product::UploadSummary;
use std::sync::Arc;

use crate::domain::a001_product::service;
use crate::shared::classifier::{get_permit_pool, QwenVlClient};
use crate::shared::config::get_config;
use crate::usecases::u101_upload_products::{self, ImportError};
use crate::usecases::u102_classify_images::ClassifyImagesExecutor;

struct UploadedFile {
    /// Имя без расширения, для имени файла-результата
    stem: String,
    bytes: Vec<u8>,
}

/// Достать из multipart первый файл и проверить, что это непустой .xlsx
async fn read_xlsx_upload(multipart: &mut Multipart) -> Result<UploadedFile, (StatusCode, String)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Некорректный запрос: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(String::from) else {
            continue;
        };

        if file_name.len() <= 5 || !file_name.to_lowercase().ends_with(".xlsx") {
            return Err((
                StatusCode::BAD_REQUEST,
                "Поддерживаются только файлы .xlsx".to_string(),
            ));
        }
        let stem = file_name[..file_name.len() - 5].to_string();

        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Ошибка чтения файла: {}", e)))?;
        if bytes.is_empty() {
            return Err((StatusCode::BAD_REQUEST, "Файл пуст".to_string()));
        }

        return Ok(UploadedFile {
            stem,
            bytes: bytes.to_vec(),
        });
    }

    Err((StatusCode::BAD_REQUEST, "Файл не передан".to_string()))
}

fn import_error_response(e: ImportError) -> (StatusCode, String) {
    match e {
        ImportError::SheetNotFound(_) | ImportError::HeadersNotResolved => {
            (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        ImportError::Document(e) => {
            tracing::error!("Workbook processing error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Ошибка обработки файла".to_string(),
            )
        }
    }
}

/// POST /upload
///
/// Принимает спецификацию, возвращает её же с колонкой артикулов и
/// сохраняет новые товары в базу.
pub async fn upload(mut multipart: Multipart) -> Result<Response, (StatusCode, String)> {
    let file = read_xlsx_upload(&mut multipart).await?;

    let processed = u101_upload_products::process_workbook(&file.bytes, &get_config().import)
        .map_err(import_error_response)?;

    let extracted = processed.products.len();
    let inserted = service::persist_new(processed.products).await.map_err(|e| {
        tracing::error!("Failed to persist products: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Ошибка сохранения товаров".to_string(),
        )
    })?;

    let summary = UploadSummary {
        extracted,
        inserted,
    };
    tracing::info!(
        "Upload '{}': extracted {}, inserted {}",
        file.stem,
        summary.extracted,
        summary.inserted
    );

    let filename = format!("{}_обработанный.xlsx", file.stem);
    Ok(super::xlsx_attachment(&filename, processed.xlsx_bytes))
}

/// POST /upload-with-images
///
/// Принимает файл с картинками товаров, возвращает его с колонкой
/// распознанных кодов ТН ВЭД. В базу ничего не пишет.
pub async fn upload_with_images(
    mut multipart: Multipart,
) -> Result<Response, (StatusCode, String)> {
    let file = read_xlsx_upload(&mut multipart).await?;

    let config = get_config();
    let executor = ClassifyImagesExecutor::new(
        Arc::new(QwenVlClient::new(&config.classifier)),
        get_permit_pool(),
    );

    let xlsx_bytes = executor
        .process_workbook(&file.bytes, &config.import)
        .await
        .map_err(|e| {
            tracing::error!("Image classification pipeline error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Ошибка обработки файла".to_string(),
            )
        })?;

    let filename = format!("{}_с_кодами.xlsx", file.stem);
    Ok(super::xlsx_attachment(&filename, xlsx_bytes))
}
