pub mod aggregate;

pub use aggregate::{Product, ProductsPage, UploadSummary, ABSENT_VALUE};
