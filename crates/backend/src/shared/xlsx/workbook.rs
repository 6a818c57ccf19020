use anyhow::{Context, Result};
use calamine::{Data, Reader, Xlsx};
use rust_xlsxwriter::{Image, Workbook};
use std::io::Cursor;

use super::drawings::EmbeddedImage;

/// Рабочая книга в памяти: значения ячеек по абсолютным координатам
///
/// Книга загружается целиком, мутируется в памяти и сериализуется заново.
/// При любой ошибке обработки частичные изменения просто отбрасываются
/// вместе с этой структурой.
#[derive(Debug, Clone)]
pub struct WorkbookData {
    pub sheets: Vec<SheetData>,
}

/// Один лист: `rows[row][col]`, индексы с нуля, совпадают с документом
///
/// calamine не читает картинки, поэтому `images` заполняет вызывающий
/// (через [`super::drawings::extract_images`]); при сериализации они
/// возвращаются в документ на свои якоря.
#[derive(Debug, Clone)]
pub struct SheetData {
    pub name: String,
    pub rows: Vec<Vec<String>>,
    pub images: Vec<EmbeddedImage>,
}

impl WorkbookData {
    /// Загрузить все листы из xlsx-файла
    pub fn from_xlsx_bytes(bytes: &[u8]) -> Result<Self> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))
            .context("Failed to open xlsx workbook")?;

        let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
        let mut sheets = Vec::with_capacity(sheet_names.len());

        for name in sheet_names {
            let range = workbook
                .worksheet_range(&name)
                .with_context(|| format!("Failed to read sheet: {}", name))?;

            let mut rows: Vec<Vec<String>> = Vec::new();
            if let (Some(start), Some(end)) = (range.start(), range.end()) {
                rows = vec![vec![String::new(); end.1 as usize + 1]; end.0 as usize + 1];
                for (row, col, value) in range.used_cells() {
                    let abs_row = start.0 as usize + row;
                    let abs_col = start.1 as usize + col;
                    rows[abs_row][abs_col] = cell_to_string(value);
                }
            }

            sheets.push(SheetData {
                name,
                rows,
                images: Vec::new(),
            });
        }

        Ok(Self { sheets })
    }

    /// Лист, в имени которого есть подстрока (без учёта регистра)
    pub fn sheet_by_name_token(&mut self, token: &str) -> Option<&mut SheetData> {
        let token = token.to_lowercase();
        self.sheets
            .iter_mut()
            .find(|s| s.name.to_lowercase().contains(&token))
    }

    pub fn first_sheet_mut(&mut self) -> Option<&mut SheetData> {
        self.sheets.first_mut()
    }

    /// Сериализовать всю книгу обратно в xlsx
    pub fn to_xlsx_bytes(&self) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();

        for sheet in &self.sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&sheet.name)?;

            for (row_idx, row) in sheet.rows.iter().enumerate() {
                for (col_idx, value) in row.iter().enumerate() {
                    if value.is_empty() {
                        continue;
                    }
                    let row_n = row_idx as u32;
                    let col_n = col_idx as u16;
                    // Числовые ячейки возвращаем числами, всё остальное — текстом
                    match value.parse::<f64>() {
                        Ok(n) if n.to_string() == *value => {
                            worksheet.write_number(row_n, col_n, n)?;
                        }
                        _ => {
                            worksheet.write_string(row_n, col_n, value)?;
                        }
                    }
                }
            }

            for image in &sheet.images {
                let img = match Image::new_from_buffer(&image.data) {
                    Ok(img) => img,
                    // Форматы вне png/jpeg/gif/bmp writer не принимает
                    Err(e) => {
                        tracing::warn!("Skipping embedded image: {}", e);
                        continue;
                    }
                };
                worksheet.insert_image(image.anchor_row as u32, image.anchor_col as u16, &img)?;
            }
        }

        let bytes = workbook
            .save_to_buffer()
            .context("Failed to serialize xlsx workbook")?;
        Ok(bytes)
    }
}

impl SheetData {
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    /// Записать значение, при необходимости расширив лист
    pub fn set_cell(&mut self, row: usize, col: usize, value: impl Into<String>) {
        if self.rows.len() <= row {
            self.rows.resize(row + 1, Vec::new());
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = value.into();
    }

    /// Вставить пустую колонку перед `col`, сдвинув остальные вправо
    pub fn insert_column(&mut self, col: usize) {
        for cells in &mut self.rows {
            if cells.len() < col {
                continue;
            }
            cells.insert(col, String::new());
        }
    }

    /// Индекс первой свободной колонки в строке заголовков
    pub fn trailing_column(&self, header_row: usize) -> usize {
        self.rows.get(header_row).map(|r| r.len()).unwrap_or(0)
    }
}

fn cell_to_string(value: &Data) -> String {
    match value {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{:?}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_xlsx(rows: &[&[&str]]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Спецификация").unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    worksheet.write_string(r as u32, c as u16, *value).unwrap();
                }
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_roundtrip_preserves_cells() {
        let bytes = build_xlsx(&[&["№", "Наименование"], &["1", "Болт"]]);
        let data = WorkbookData::from_xlsx_bytes(&bytes).unwrap();
        assert_eq!(data.sheets.len(), 1);
        assert_eq!(data.sheets[0].cell(0, 1), "Наименование");
        assert_eq!(data.sheets[0].cell(1, 0), "1");

        let out = data.to_xlsx_bytes().unwrap();
        let reloaded = WorkbookData::from_xlsx_bytes(&out).unwrap();
        assert_eq!(reloaded.sheets[0].name, "Спецификация");
        assert_eq!(reloaded.sheets[0].cell(1, 1), "Болт");
    }

    #[test]
    fn test_insert_column_shifts_right() {
        let bytes = build_xlsx(&[&["a", "b", "c"], &["1", "2", "3"]]);
        let mut data = WorkbookData::from_xlsx_bytes(&bytes).unwrap();
        let sheet = data.first_sheet_mut().unwrap();
        sheet.insert_column(1);
        sheet.set_cell(0, 1, "x");
        assert_eq!(sheet.cell(0, 0), "a");
        assert_eq!(sheet.cell(0, 1), "x");
        assert_eq!(sheet.cell(0, 2), "b");
        assert_eq!(sheet.cell(1, 3), "3");
    }

    #[test]
    fn test_set_cell_grows_sheet() {
        let mut sheet = SheetData {
            name: "s".to_string(),
            rows: Vec::new(),
            images: Vec::new(),
        };
        sheet.set_cell(2, 3, "v");
        assert_eq!(sheet.cell(2, 3), "v");
        assert_eq!(sheet.cell(0, 0), "");
        assert_eq!(sheet.trailing_column(2), 4);
    }

    #[test]
    fn test_sheet_by_name_token_is_case_insensitive() {
        let bytes = build_xlsx(&[&["x"]]);
        let mut data = WorkbookData::from_xlsx_bytes(&bytes).unwrap();
        assert!(data.sheet_by_name_token("спецификация").is_some());
        assert!(data.sheet_by_name_token("данные").is_none());
    }

    #[test]
    fn test_malformed_workbook_is_rejected() {
        assert!(WorkbookData::from_xlsx_bytes(b"not an xlsx").is_err());
    }
}
