use crate::shared::config::ImportConfig;
use crate::shared::xlsx::SheetData;

/// Найденные позиции логических колонок спецификации
///
/// Все индексы 0-based. Карта валидна только если найдены все пять
/// колонок; частичное совпадение не даёт headerRow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub header_row: usize,
    pub number: usize,
    pub name: usize,
    pub model: usize,
    pub brand: usize,
    pub tariff_code: usize,
}

impl ColumnMap {
    /// Просканировать лист сверху вниз и найти строку заголовков
    ///
    /// Для номера строки — точное совпадение, для остальных — поиск
    /// подстроки без учёта регистра. Сканирование останавливается на
    /// первой строке с полным покрытием, поэтому совпадения словаря в
    /// данных ниже заголовка никогда не рассматриваются.
    pub fn resolve(sheet: &SheetData, vocabulary: &ImportConfig) -> Option<Self> {
        let number_header = vocabulary.number_header.to_lowercase();
        let name_header = vocabulary.name_header.to_lowercase();
        let article_header = vocabulary.article_header.to_lowercase();
        let brand_header = vocabulary.brand_header.to_lowercase();
        let tariff_header = vocabulary.tariff_code_header.to_lowercase();

        for (row_idx, row) in sheet.rows.iter().enumerate() {
            let mut number = None;
            let mut name = None;
            let mut model = None;
            let mut brand = None;
            let mut tariff_code = None;

            for (col_idx, cell) in row.iter().enumerate() {
                let value = cell.trim().to_lowercase();
                if value.is_empty() {
                    continue;
                }

                // Первая подходящая ячейка выигрывает
                if number.is_none() && value == number_header {
                    number = Some(col_idx);
                    continue;
                }
                if name.is_none() && value.contains(&name_header) {
                    name = Some(col_idx);
                    continue;
                }
                // Колонка "Артикул" поставщика содержит модель товара
                if model.is_none() && value.contains(&article_header) {
                    model = Some(col_idx);
                    continue;
                }
                if brand.is_none() && value.contains(&brand_header) {
                    brand = Some(col_idx);
                    continue;
                }
                if tariff_code.is_none() && value.contains(&tariff_header) {
                    tariff_code = Some(col_idx);
                }
            }

            if let (Some(number), Some(name), Some(model), Some(brand), Some(tariff_code)) =
                (number, name, model, brand, tariff_code)
            {
                return Some(Self {
                    header_row: row_idx,
                    number,
                    name,
                    model,
                    brand,
                    tariff_code,
                });
            }
        }

        None
    }
}
