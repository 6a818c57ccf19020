use super::column_map::ColumnMap;
use crate::domain::a001_product::article::generate_article;
use crate::shared::config::ImportConfig;
use crate::shared::xlsx::{extract_images, SheetData, WorkbookData};
use contracts::domain::a001_product::{Product, ABSENT_VALUE};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Лист с названием \"{0}\" не найден")]
    SheetNotFound(String),

    #[error("Не найдена строка заголовков спецификации")]
    HeadersNotResolved,

    #[error(transparent)]
    Document(#[from] anyhow::Error),
}

/// Результат обработки загруженной спецификации
pub struct ProcessedWorkbook {
    /// Книга с добавленной колонкой артикулов
    pub xlsx_bytes: Vec<u8>,
    /// Извлечённые товары в порядке строк
    pub products: Vec<Product>,
}

/// Обработать загруженный файл: найти колонки, извлечь товары,
/// сгенерировать артикулы и дописать их новой колонкой рядом с
/// наименованием
///
/// Книга мутируется в памяти и сериализуется только после успешного
/// прохода; при ошибке наружу не уходит ничего.
pub fn process_workbook(
    xlsx_bytes: &[u8],
    vocabulary: &ImportConfig,
) -> Result<ProcessedWorkbook, ImportError> {
    let mut workbook = WorkbookData::from_xlsx_bytes(xlsx_bytes)?;
    let mut images = extract_images(xlsx_bytes)?;

    let sheet = workbook
        .sheet_by_name_token(&vocabulary.sheet_name_token)
        .ok_or_else(|| ImportError::SheetNotFound(vocabulary.sheet_name_token.clone()))?;

    let map = ColumnMap::resolve(sheet, vocabulary).ok_or(ImportError::HeadersNotResolved)?;

    // Новая колонка сразу после наименования
    let article_column = map.name + 1;
    sheet.insert_column(article_column);

    // Картинки документа возвращаются в выходной файл; якоря правее
    // вставленной колонки сдвигаются вместе с данными
    for image in &mut images {
        if image.anchor_col >= article_column {
            image.anchor_col += 1;
        }
    }
    sheet.images = images;
    sheet.set_cell(
        map.header_row,
        article_column,
        vocabulary.article_column_header.clone(),
    );

    // Индексы правее вставленной колонки сдвинулись
    let shift = |col: usize| if col >= article_column { col + 1 } else { col };
    let number_col = shift(map.number);
    let model_col = shift(map.model);
    let brand_col = shift(map.brand);
    let tariff_col = shift(map.tariff_code);

    let products = extract_products(
        sheet,
        map.header_row,
        number_col,
        map.name,
        model_col,
        brand_col,
        tariff_col,
        article_column,
    );

    let xlsx_bytes = workbook.to_xlsx_bytes()?;
    Ok(ProcessedWorkbook {
        xlsx_bytes,
        products,
    })
}

/// Пройти строки данных, собрать товары и вписать артикулы
///
/// Таблица заканчивается на первой строке, где номер не парсится как
/// целое. Строка с чисто числовым наименованием — мусор (итоги и т.п.),
/// пропускается без ошибки.
#[allow(clippy::too_many_arguments)]
fn extract_products(
    sheet: &mut SheetData,
    header_row: usize,
    number_col: usize,
    name_col: usize,
    model_col: usize,
    brand_col: usize,
    tariff_col: usize,
    article_col: usize,
) -> Vec<Product> {
    let mut products = Vec::new();

    for row in header_row + 1.. {
        if row >= sheet.rows.len() {
            break;
        }

        let number_valid = sheet.cell(row, number_col).trim().parse::<i64>().is_ok();
        if !number_valid {
            break;
        }

        let name_raw = sheet.cell(row, name_col).trim().to_string();
        if name_raw.parse::<i64>().is_ok() {
            continue;
        }

        let name = cell_or_absent(&name_raw);
        let model = cell_or_absent(sheet.cell(row, model_col).trim());
        let brand = cell_or_absent(sheet.cell(row, brand_col).trim());
        let tariff_code = cell_or_absent(sheet.cell(row, tariff_col).trim());

        let article = generate_article(&name, &model, &tariff_code);
        sheet.set_cell(row, article_col, article.clone());

        products.push(Product::new(name, model, brand, tariff_code, article));
    }

    products
}

fn cell_or_absent(value: &str) -> String {
    if value.is_empty() {
        ABSENT_VALUE.to_string()
    } else {
        value.to_string()
    }
}
