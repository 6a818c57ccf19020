pub mod u101_upload_products;
pub mod u102_classify_images;
