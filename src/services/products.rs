use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{product, product_variant, Product, ProductVariant};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Service for catalog management
#[derive(Debug, Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: Option<i32>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub status: Option<product::ProductStatus>,
    pub image_url: Option<String>,
    pub sale_price: Option<Decimal>,
    pub is_on_sale: Option<bool>,
    pub sale_starts_at: Option<DateTime<Utc>>,
    pub sale_ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateVariantInput {
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub price: Decimal,
    pub stock: Option<i32>,
    pub options: Option<serde_json::Value>,
    pub position: Option<i32>,
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn require_non_negative(field: &str, value: Decimal) -> Result<(), ServiceError> {
    if value < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "{} must not be negative",
            field
        )));
    }
    Ok(())
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;
        require_non_negative("price", input.price)?;

        let slug = slugify(&input.name);
        if slug.is_empty() {
            return Err(ServiceError::ValidationError(
                "product name must contain at least one alphanumeric character".to_string(),
            ));
        }

        let existing = Product::find()
            .filter(product::Column::Slug.eq(slug.clone()))
            .one(self.db.as_ref())
            .await?;
        if existing.is_some() {
            return Err(ServiceError::DuplicateKey(format!(
                "product with slug '{}' already exists",
                slug
            )));
        }

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            slug: Set(slug),
            description: Set(input.description.unwrap_or_default()),
            status: Set(product::ProductStatus::Draft),
            price: Set(input.price),
            sale_price: Set(None),
            is_on_sale: Set(false),
            sale_starts_at: Set(None),
            sale_ends_at: Set(None),
            stock: Set(input.stock.unwrap_or(0).max(0)),
            sold_count: Set(0),
            image_url: Set(input.image_url),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let saved = model.insert(self.db.as_ref()).await?;
        info!(product_id = %saved.id, "Created product");
        self.event_sender
            .send_or_log(Event::ProductCreated(saved.id))
            .await;
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn get_product_with_variants(
        &self,
        id: Uuid,
    ) -> Result<(product::Model, Vec<product_variant::Model>), ServiceError> {
        let product = self.get_product(id).await?;
        let variants = ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(id))
            .order_by_asc(product_variant::Column::Position)
            .all(self.db.as_ref())
            .await?;
        Ok((product, variants))
    }

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        per_page: u64,
        search: Option<&str>,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let per_page = per_page.clamp(1, 100);
        let mut query = Product::find().order_by_desc(product::Column::CreatedAt);
        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            query = query.filter(product::Column::Name.contains(term));
        }
        let paginator = query.paginate(self.db.as_ref(), per_page);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((products, total))
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: Uuid,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;
        if let Some(price) = input.price {
            require_non_negative("price", price)?;
        }
        if let Some(sale_price) = input.sale_price {
            require_non_negative("sale_price", sale_price)?;
        }

        let existing = self.get_product(id).await?;
        let mut model: product::ActiveModel = existing.into();

        if let Some(name) = input.name {
            model.name = Set(name);
        }
        if let Some(description) = input.description {
            model.description = Set(description);
        }
        if let Some(price) = input.price {
            model.price = Set(price);
        }
        if let Some(stock) = input.stock {
            model.stock = Set(stock.max(0));
        }
        if let Some(status) = input.status {
            model.status = Set(status);
        }
        if let Some(image_url) = input.image_url {
            model.image_url = Set(Some(image_url));
        }
        if let Some(sale_price) = input.sale_price {
            model.sale_price = Set(Some(sale_price));
        }
        if let Some(is_on_sale) = input.is_on_sale {
            model.is_on_sale = Set(is_on_sale);
        }
        if let Some(starts) = input.sale_starts_at {
            model.sale_starts_at = Set(Some(starts));
        }
        if let Some(ends) = input.sale_ends_at {
            model.sale_ends_at = Set(Some(ends));
        }
        model.updated_at = Set(Utc::now());

        let updated = model.update(self.db.as_ref()).await?;
        self.event_sender
            .send_or_log(Event::ProductUpdated(updated.id))
            .await;
        Ok(updated)
    }

    /// Adds a variant and folds its stock into the product aggregate.
    #[instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create_variant(
        &self,
        product_id: Uuid,
        input: CreateVariantInput,
    ) -> Result<product_variant::Model, ServiceError> {
        input.validate()?;
        require_non_negative("price", input.price)?;

        let product = self.get_product(product_id).await?;

        let existing = ProductVariant::find()
            .filter(product_variant::Column::Sku.eq(input.sku.clone()))
            .one(self.db.as_ref())
            .await?;
        if existing.is_some() {
            return Err(ServiceError::DuplicateKey(format!(
                "variant with SKU '{}' already exists",
                input.sku
            )));
        }

        let now = Utc::now();
        let stock = input.stock.unwrap_or(0).max(0);
        let model = product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            sku: Set(input.sku),
            name: Set(input.name),
            price: Set(input.price),
            stock: Set(stock),
            sold_count: Set(0),
            options: Set(input.options.unwrap_or_else(|| serde_json::json!({}))),
            position: Set(input.position.unwrap_or(0)),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let saved = model.insert(self.db.as_ref()).await?;

        let current_stock = product.stock;
        let mut product_model: product::ActiveModel = product.into();
        product_model.stock = Set(current_stock + stock);
        product_model.updated_at = Set(now);
        product_model.update(self.db.as_ref()).await?;

        info!(product_id = %product_id, variant_id = %saved.id, "Created variant");
        self.event_sender
            .send_or_log(Event::VariantCreated {
                product_id,
                variant_id: saved.id,
            })
            .await;
        Ok(saved)
    }
}
