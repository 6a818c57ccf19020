use chrono::Utc;
use contracts::domain::a001_product::Product;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use sea_orm::entity::prelude::*;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set};

use crate::shared::data::db::get_connection;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "a001_product")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub model: String,
    pub brand: String,
    pub tariff_code: String,
    pub article: String,
    pub uploaded_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Product {
    fn from(m: Model) -> Self {
        Product {
            id: m.id,
            name: m.name,
            model: m.model,
            brand: m.brand,
            tariff_code: m.tariff_code,
            article: m.article,
            uploaded_at: m.uploaded_at.unwrap_or_else(Utc::now),
        }
    }
}

fn to_active_model(p: &Product) -> ActiveModel {
    ActiveModel {
        id: Set(p.id.clone()),
        name: Set(p.name.clone()),
        model: Set(p.model.clone()),
        brand: Set(p.brand.clone()),
        tariff_code: Set(p.tariff_code.clone()),
        article: Set(p.article.clone()),
        uploaded_at: Set(Some(p.uploaded_at)),
    }
}

fn conn() -> &'static DatabaseConnection {
    get_connection()
}

/// Какие из переданных артикулов уже есть в базе (один IN-запрос)
pub async fn find_existing_articles(articles: &[String]) -> anyhow::Result<HashSet<String>> {
    if articles.is_empty() {
        return Ok(HashSet::new());
    }
    let existing: Vec<String> = Entity::find()
        .select_only()
        .column(Column::Article)
        .filter(Column::Article.is_in(articles.iter().cloned()))
        .into_tuple()
        .all(conn())
        .await?;
    Ok(existing.into_iter().collect())
}

/// Вставить пачку товаров одним запросом
pub async fn insert_batch(products: &[Product]) -> anyhow::Result<()> {
    if products.is_empty() {
        return Ok(());
    }
    let models: Vec<ActiveModel> = products.iter().map(to_active_model).collect();
    Entity::insert_many(models).exec(conn()).await?;
    Ok(())
}

pub async fn count_all() -> anyhow::Result<u64> {
    Ok(Entity::find().count(conn()).await?)
}

/// Страница товаров, новые сверху
pub async fn list_page(page: u64, page_size: u64) -> anyhow::Result<Vec<Product>> {
    let items = Entity::find()
        .order_by_desc(Column::UploadedAt)
        .paginate(conn(), page_size)
        .fetch_page(page.saturating_sub(1))
        .await?;
    Ok(items.into_iter().map(Into::into).collect())
}

/// Все товары в порядке загрузки (для выгрузки в Excel)
pub async fn list_all_ordered() -> anyhow::Result<Vec<Product>> {
    let items = Entity::find()
        .order_by_asc(Column::UploadedAt)
        .all(conn())
        .await?;
    Ok(items.into_iter().map(Into::into).collect())
}
