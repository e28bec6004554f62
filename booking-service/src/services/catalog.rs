//! Catalog lookup: whether a product uses open or fixed scheduling.
//!
//! The product catalog is owned elsewhere; this service only reads the
//! scheduling mode to decide the end-of-life rule for emptied slots.

use crate::error::BookingError;
use crate::models::{Product, ScheduleMode};
use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::{Collection, Database};
use uuid::Uuid;

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn is_open_schedule(&self, org_id: &str, product_id: Uuid)
        -> Result<bool, BookingError>;
}

#[derive(Clone)]
pub struct MongoCatalog {
    products: Collection<Product>,
}

impl MongoCatalog {
    pub fn new(db: &Database) -> Self {
        Self {
            products: db.collection("products"),
        }
    }
}

#[async_trait]
impl Catalog for MongoCatalog {
    #[tracing::instrument(skip(self))]
    async fn is_open_schedule(
        &self,
        org_id: &str,
        product_id: Uuid,
    ) -> Result<bool, BookingError> {
        let filter = doc! { "_id": product_id.to_string(), "org_id": org_id };
        let product = self
            .products
            .find_one(filter, None)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("product {}", product_id)))?;
        Ok(product.schedule_mode == ScheduleMode::Open)
    }
}
