use super::repository;
use contracts::domain::a001_product::{Product, ProductsPage};
use std::collections::HashSet;

const PAGE_SIZE: u64 = 500;

/// Сохранить новые товары, отбросив дубликаты по артикулу
///
/// Двухступенчатый фильтр: сначала повторы внутри пачки, затем артикулы,
/// уже лежащие в базе. Повторная загрузка того же каталога ничего не
/// вставляет. Существующие записи не обновляются: равенство артикулов
/// означает равенство полей, расхождение — коллизия хеша, которую здесь
/// не разрешаем.
pub async fn persist_new(products: Vec<Product>) -> anyhow::Result<usize> {
    let candidates = dedup_by_article(products);

    let articles: Vec<String> = candidates.iter().map(|p| p.article.clone()).collect();
    let existing = repository::find_existing_articles(&articles).await?;

    let to_insert: Vec<Product> = candidates
        .into_iter()
        .filter(|p| !existing.contains(&p.article))
        .collect();

    if !to_insert.is_empty() {
        repository::insert_batch(&to_insert).await?;
    }

    tracing::info!(
        "Persisted {} new products ({} already known)",
        to_insert.len(),
        existing.len()
    );
    Ok(to_insert.len())
}

/// Оставить первое вхождение каждого артикула, сохранив порядок
fn dedup_by_article(products: Vec<Product>) -> Vec<Product> {
    let mut seen = HashSet::new();
    products
        .into_iter()
        .filter(|p| seen.insert(p.article.clone()))
        .collect()
}

pub async fn list_page(page: u64) -> anyhow::Result<ProductsPage> {
    let total_count = repository::count_all().await?;
    let total_pages = total_count.div_ceil(PAGE_SIZE);

    let mut page = page.max(1);
    if total_pages > 0 && page > total_pages {
        page = total_pages;
    }

    let items = repository::list_page(page, PAGE_SIZE).await?;
    Ok(ProductsPage {
        items,
        page,
        total_pages,
        total_count,
    })
}

pub async fn list_all_ordered() -> anyhow::Result<Vec<Product>> {
    repository::list_all_ordered().await
}
