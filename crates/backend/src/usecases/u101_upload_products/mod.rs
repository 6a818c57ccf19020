pub mod column_map;
pub mod executor;

pub use column_map::ColumnMap;
pub use executor::{process_workbook, ImportError, ProcessedWorkbook};
