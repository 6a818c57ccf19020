pub mod article;
pub mod repository;
pub mod service;
