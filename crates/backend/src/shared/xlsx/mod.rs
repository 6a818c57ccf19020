pub mod drawings;
pub mod workbook;

pub use drawings::{extract_images, EmbeddedImage};
pub use workbook::{SheetData, WorkbookData};
