pub mod executor;

pub use executor::{ClassifyImagesExecutor, RowCode, ERROR_SENTINEL};
