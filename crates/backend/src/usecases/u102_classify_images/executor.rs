use crate::shared::classifier::ImageClassifier;
use crate::shared::config::ImportConfig;
use crate::shared::xlsx::{extract_images, EmbeddedImage, WorkbookData};
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Значение ячейки для картинки, которую не удалось распознать
pub const ERROR_SENTINEL: &str = "ошибка";

/// Код, полученный для одной картинки, с её якорной строкой
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowCode {
    pub row: usize,
    pub code: String,
}

/// Конвейер распознавания: картинки из книги -> коды ТН ВЭД в книге
///
/// Классификатор и пул разрешений передаются снаружи; сам конвейер
/// глобального состояния не держит.
pub struct ClassifyImagesExecutor {
    classifier: Arc<dyn ImageClassifier>,
    permits: Arc<Semaphore>,
}

impl ClassifyImagesExecutor {
    pub fn new(classifier: Arc<dyn ImageClassifier>, permits: Arc<Semaphore>) -> Self {
        Self {
            classifier,
            permits,
        }
    }

    /// Извлечь картинки, распознать и дописать коды колонкой справа
    ///
    /// Падает только на нечитаемой книге. Отказ классификатора, даже
    /// полный, превращается в ячейки-заглушки, а не в ошибку запроса.
    /// Картинки возвращаются в выходной файл на свои якоря.
    pub async fn process_workbook(
        &self,
        xlsx_bytes: &[u8],
        vocabulary: &ImportConfig,
    ) -> Result<Vec<u8>> {
        let mut workbook = WorkbookData::from_xlsx_bytes(xlsx_bytes)?;
        let images = extract_images(xlsx_bytes)?;
        tracing::info!(
            "Classifying {} embedded images via {}",
            images.len(),
            self.classifier.provider_name()
        );

        let codes = self.classify_all(images.clone()).await;
        let merged = merge_row_codes(&codes);

        if let Some(sheet) = workbook.first_sheet_mut() {
            let column = sheet.trailing_column(0);
            sheet.set_cell(0, column, vocabulary.tariff_column_header.clone());
            for (row, code) in merged {
                sheet.set_cell(row, column, code);
            }
            sheet.images = images;
        }

        workbook.to_xlsx_bytes()
    }

    /// Распознать все картинки с ограничением одновременных запросов
    ///
    /// Каждая картинка — отдельная задача в JoinSet, разрешение берётся
    /// внутри задачи и отпускается на любом исходе. Дроп future (клиент
    /// оборвал запрос) отменяет все задачи: висящие на семафоре за слот
    /// больше не конкурируют. Результат раскладывается по индексу
    /// запуска, поэтому вход мерджа детерминирован.
    pub async fn classify_all(&self, images: Vec<EmbeddedImage>) -> Vec<RowCode> {
        let mut tasks = tokio::task::JoinSet::new();
        let mut anchor_rows = Vec::with_capacity(images.len());

        for (index, image) in images.into_iter().enumerate() {
            anchor_rows.push(image.anchor_row);
            let classifier = self.classifier.clone();
            let permits = self.permits.clone();

            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    // Семафор закрывается только при остановке процесса
                    Err(_) => return (index, ERROR_SENTINEL.to_string()),
                };
                match classifier
                    .classify_image(&image.data, &image.extension)
                    .await
                {
                    Ok(code) => (index, code),
                    Err(e) => {
                        tracing::warn!("Image classification failed: {}", e);
                        (index, ERROR_SENTINEL.to_string())
                    }
                }
            });
        }

        let mut codes = vec![ERROR_SENTINEL.to_string(); anchor_rows.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, code)) => codes[index] = code,
                // Прерванная задача оставляет заглушку в своей ячейке
                Err(e) => tracing::warn!("Classification task aborted: {}", e),
            }
        }

        anchor_rows
            .into_iter()
            .zip(codes)
            .map(|(row, code)| RowCode { row, code })
            .collect()
    }
}

/// Свести коды к одному значению на строку
///
/// Внутри строки коды идут в порядке обнаружения, склеиваются через ", ",
/// точные повторы отбрасываются.
pub fn merge_row_codes(codes: &[RowCode]) -> Vec<(usize, String)> {
    let mut by_row: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for rc in codes {
        let parts = by_row.entry(rc.row).or_default();
        if !parts.iter().any(|p| p == &rc.code) {
            parts.push(rc.code.clone());
        }
    }
    by_row
        .into_iter()
        .map(|(row, parts)| (row, parts.join(", ")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::classifier::ClassifierError;
    use async_trait::async_trait;
    use rust_xlsxwriter::Workbook;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn row_code(row: usize, code: &str) -> RowCode {
        RowCode {
            row,
            code: code.to_string(),
        }
    }

    fn image(row: usize) -> EmbeddedImage {
        EmbeddedImage {
            anchor_row: row,
            anchor_col: 0,
            data: vec![0u8; 4],
            extension: "png".to_string(),
        }
    }

    // Прозрачный PNG 1x1
    const PNG_1X1: &str =
        "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    fn png_bytes() -> Vec<u8> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(PNG_1X1)
            .unwrap()
    }

    #[test]
    fn test_merge_suppresses_exact_duplicates() {
        let merged = merge_row_codes(&[row_code(2, "1234"), row_code(2, "1234")]);
        assert_eq!(merged, vec![(2, "1234".to_string())]);
    }

    #[test]
    fn test_merge_joins_distinct_codes_in_discovery_order() {
        let merged = merge_row_codes(&[row_code(2, "1234"), row_code(2, "5678")]);
        assert_eq!(merged, vec![(2, "1234, 5678".to_string())]);
    }

    #[test]
    fn test_merge_keeps_rows_separate() {
        let merged = merge_row_codes(&[
            row_code(5, "1111"),
            row_code(2, "2222"),
            row_code(5, "3333"),
        ]);
        assert_eq!(
            merged,
            vec![(2, "2222".to_string()), (5, "1111, 3333".to_string())]
        );
    }

    /// Классификатор-счётчик: следит за числом одновременных вызовов
    struct CountingClassifier {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl ImageClassifier for CountingClassifier {
        async fn classify_image(
            &self,
            _image: &[u8],
            _extension: &str,
        ) -> Result<String, ClassifierError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("7318159000".to_string())
        }

        fn provider_name(&self) -> &str {
            "counting-mock"
        }
    }

    /// Классификатор с фиксированным ответом
    struct StaticClassifier(&'static str);

    #[async_trait]
    impl ImageClassifier for StaticClassifier {
        async fn classify_image(
            &self,
            _image: &[u8],
            _extension: &str,
        ) -> Result<String, ClassifierError> {
            Ok(self.0.to_string())
        }

        fn provider_name(&self) -> &str {
            "static-mock"
        }
    }

    /// Классификатор, который не успевает ответить за время теста
    struct SlowClassifier;

    #[async_trait]
    impl ImageClassifier for SlowClassifier {
        async fn classify_image(
            &self,
            _image: &[u8],
            _extension: &str,
        ) -> Result<String, ClassifierError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("0000000000".to_string())
        }

        fn provider_name(&self) -> &str {
            "slow-mock"
        }
    }

    struct FailingClassifier;

    #[async_trait]
    impl ImageClassifier for FailingClassifier {
        async fn classify_image(
            &self,
            _image: &[u8],
            _extension: &str,
        ) -> Result<String, ClassifierError> {
            Err(ClassifierError::NetworkError("connection refused".to_string()))
        }

        fn provider_name(&self) -> &str {
            "failing-mock"
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_permit_pool_caps_concurrency() {
        let classifier = Arc::new(CountingClassifier {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let executor = ClassifyImagesExecutor::new(classifier.clone(), Arc::new(Semaphore::new(15)));

        let images: Vec<EmbeddedImage> = (0..20).map(image).collect();
        let codes = executor.classify_all(images).await;

        assert_eq!(codes.len(), 20);
        assert!(codes.iter().all(|c| c.code == "7318159000"));
        assert!(classifier.max_in_flight.load(Ordering::SeqCst) <= 15);
        // Строки сохраняют порядок запуска
        let rows: Vec<usize> = codes.iter().map(|c| c.row).collect();
        assert_eq!(rows, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_classifier_failure_degrades_to_sentinel() {
        let executor =
            ClassifyImagesExecutor::new(Arc::new(FailingClassifier), Arc::new(Semaphore::new(15)));
        let codes = executor.classify_all(vec![image(1), image(2)]).await;

        assert_eq!(codes.len(), 2);
        assert!(codes.iter().all(|c| c.code == ERROR_SENTINEL));
    }

    #[tokio::test]
    async fn test_process_workbook_appends_code_column() {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Спецификация").unwrap();
        worksheet.write_string(0, 0, "№").unwrap();
        worksheet.write_string(0, 1, "Наименование товара").unwrap();
        worksheet.write_string(1, 0, "1").unwrap();
        worksheet.write_string(1, 1, "Болт М6").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let executor =
            ClassifyImagesExecutor::new(Arc::new(FailingClassifier), Arc::new(Semaphore::new(15)));
        let out = executor
            .process_workbook(&bytes, &ImportConfig::default())
            .await
            .unwrap();

        // Книга без картинок: только заголовок новой колонки
        let mut data = WorkbookData::from_xlsx_bytes(&out).unwrap();
        let sheet = data.first_sheet_mut().unwrap();
        assert_eq!(sheet.cell(0, 2), "Код ТН ВЭД");
        assert_eq!(sheet.cell(1, 1), "Болт М6");
    }

    #[tokio::test]
    async fn test_process_workbook_keeps_embedded_images() {
        let png = png_bytes();

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Спецификация").unwrap();
        worksheet.write_string(0, 0, "№").unwrap();
        worksheet.write_string(1, 0, "1").unwrap();
        let img = rust_xlsxwriter::Image::new_from_buffer(&png).unwrap();
        worksheet.insert_image(1, 0, &img).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let executor = ClassifyImagesExecutor::new(
            Arc::new(StaticClassifier("7318159000")),
            Arc::new(Semaphore::new(15)),
        );
        let out = executor
            .process_workbook(&bytes, &ImportConfig::default())
            .await
            .unwrap();

        // Фотография осталась в выходном файле на своём якоре
        let images = extract_images(&out).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].anchor_row, 1);
        assert_eq!(images[0].data, png);

        // И код записан в колонку напротив неё
        let mut data = WorkbookData::from_xlsx_bytes(&out).unwrap();
        let sheet = data.first_sheet_mut().unwrap();
        assert_eq!(sheet.cell(0, 1), "Код ТН ВЭД");
        assert_eq!(sheet.cell(1, 1), "7318159000");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_request_releases_permit_slots() {
        let permits = Arc::new(Semaphore::new(2));
        let executor = ClassifyImagesExecutor::new(Arc::new(SlowClassifier), permits.clone());
        let images: Vec<EmbeddedImage> = (0..4).map(image).collect();

        // Клиент оборвал запрос: future дропается по таймауту
        let result =
            tokio::time::timeout(Duration::from_millis(50), executor.classify_all(images)).await;
        assert!(result.is_err());

        // Задачи отменены, слоты вернулись в пул целиком
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(permits.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_process_workbook_rejects_garbage() {
        let executor =
            ClassifyImagesExecutor::new(Arc::new(FailingClassifier), Arc::new(Semaphore::new(15)));
        let result = executor
            .process_workbook(b"not an xlsx", &ImportConfig::default())
            .await;
        assert!(result.is_err());
    }
}
