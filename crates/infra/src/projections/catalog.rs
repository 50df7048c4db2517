//! Catalog projection: the storefront's product listing read model.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;
use serde_json::Value as JsonValue;

use reweave_core::Money;
use reweave_events::EventEnvelope;
use reweave_products::{ProductEvent, ProductId, ProductStatus, Variant};

use super::{ProjectionError, StreamCursors};

/// One catalog entry, denormalized for listing and detail pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductRow {
    pub product_id: ProductId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: Money,
    pub category: String,
    pub tags: Vec<String>,
    pub is_preorder: bool,
    pub variants: Vec<Variant>,
    pub status: ProductStatus,
    pub view_count: u64,
}

/// Sort order for catalog listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Popularity,
}

/// Listing filter. Empty filters match everything.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub status: Option<ProductStatus>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub sort: ProductSort,
}

impl ProductQuery {
    fn matches(&self, row: &ProductRow) -> bool {
        if let Some(status) = self.status {
            if row.status != status {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if !row.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let in_name = row.name.to_lowercase().contains(&needle);
            let in_tags = row.tags.iter().any(|t| t.to_lowercase().contains(&needle));
            if !in_name && !in_tags {
                return false;
            }
        }
        true
    }
}

/// Product read model with a slug index for detail-page lookups.
///
/// Insertion order doubles as creation order, so `Newest` sorting walks
/// the rows in reverse.
#[derive(Debug, Default)]
pub struct CatalogProjection {
    rows: RwLock<HashMap<ProductId, ProductRow>>,
    by_slug: RwLock<HashMap<String, ProductId>>,
    insertion_order: RwLock<Vec<ProductId>>,
    cursors: StreamCursors,
}

impl CatalogProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, product_id: ProductId) -> Option<ProductRow> {
        self.rows.read().ok()?.get(&product_id).cloned()
    }

    pub fn by_slug(&self, slug: &str) -> Option<ProductRow> {
        let id = *self.by_slug.read().ok()?.get(slug)?;
        self.get(id)
    }

    pub fn slug_taken(&self, slug: &str) -> bool {
        self.by_slug
            .read()
            .map(|m| m.contains_key(slug))
            .unwrap_or(false)
    }

    pub fn list(&self, query: &ProductQuery) -> Vec<ProductRow> {
        let order = self
            .insertion_order
            .read()
            .map(|o| o.clone())
            .unwrap_or_default();
        let rows = match self.rows.read() {
            Ok(rows) => rows,
            Err(_) => return Vec::new(),
        };

        let mut matched: Vec<ProductRow> = order
            .iter()
            .filter_map(|id| rows.get(id))
            .filter(|row| query.matches(row))
            .cloned()
            .collect();

        match query.sort {
            ProductSort::Newest => matched.reverse(),
            ProductSort::PriceAsc => matched.sort_by_key(|r| r.price),
            ProductSort::PriceDesc => {
                matched.sort_by_key(|r| r.price);
                matched.reverse();
            }
            ProductSort::Popularity => {
                matched.sort_by(|a, b| b.view_count.cmp(&a.view_count));
            }
        }
        matched
    }

    pub fn reset(&self) {
        self.cursors.clear();
        if let Ok(mut rows) = self.rows.write() {
            rows.clear();
        }
        if let Ok(mut index) = self.by_slug.write() {
            index.clear();
        }
        if let Ok(mut order) = self.insertion_order.write() {
            order.clear();
        }
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if !self.cursors.check(aggregate_id, seq)? {
            return Ok(());
        }

        let event: ProductEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        self.apply_event(&event);
        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    fn apply_event(&self, event: &ProductEvent) {
        match event {
            ProductEvent::ProductCreated(e) => {
                let row = ProductRow {
                    product_id: e.product_id,
                    name: e.details.name.clone(),
                    slug: e.details.slug.clone(),
                    description: e.details.description.clone(),
                    price: e.details.price,
                    category: e.details.category.clone(),
                    tags: e.details.tags.clone(),
                    is_preorder: e.details.is_preorder,
                    variants: e.variants.clone(),
                    status: ProductStatus::Draft,
                    view_count: 0,
                };
                if let Ok(mut index) = self.by_slug.write() {
                    index.insert(row.slug.clone(), e.product_id);
                }
                if let Ok(mut order) = self.insertion_order.write() {
                    order.push(e.product_id);
                }
                if let Ok(mut rows) = self.rows.write() {
                    rows.insert(e.product_id, row);
                }
            }
            ProductEvent::ProductUpdated(e) => {
                let old_slug = self.get(e.product_id).map(|r| r.slug);
                self.update_row(e.product_id, |row| {
                    row.name = e.details.name.clone();
                    row.slug = e.details.slug.clone();
                    row.description = e.details.description.clone();
                    row.price = e.details.price;
                    row.category = e.details.category.clone();
                    row.tags = e.details.tags.clone();
                    row.is_preorder = e.details.is_preorder;
                });
                if let Some(old_slug) = old_slug {
                    if old_slug != e.details.slug {
                        if let Ok(mut index) = self.by_slug.write() {
                            index.remove(&old_slug);
                            index.insert(e.details.slug.clone(), e.product_id);
                        }
                    }
                }
            }
            ProductEvent::ProductActivated(e) => {
                self.update_row(e.product_id, |row| row.status = ProductStatus::Active);
            }
            ProductEvent::ProductArchived(e) => {
                self.update_row(e.product_id, |row| row.status = ProductStatus::Archived);
            }
            ProductEvent::ProductViewed(e) => {
                self.update_row(e.product_id, |row| row.view_count += 1);
            }
        }
    }

    fn update_row(&self, product_id: ProductId, f: impl FnOnce(&mut ProductRow)) {
        if let Ok(mut rows) = self.rows.write() {
            if let Some(row) = rows.get_mut(&product_id) {
                f(row);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reweave_core::AggregateId;
    use reweave_products::{ProductCreated, ProductDetails, ProductUpdated, ProductViewed};
    use chrono::Utc;
    use uuid::Uuid;

    fn envelope(product_id: ProductId, seq: u64, event: &ProductEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            product_id.0,
            "products.product",
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    fn details(name: &str, slug: &str, cents: i64) -> ProductDetails {
        ProductDetails {
            name: name.to_string(),
            slug: slug.to_string(),
            description: String::new(),
            price: Money::from_cents(cents),
            category: "scarves".to_string(),
            tags: vec!["batik".to_string()],
            is_preorder: false,
        }
    }

    fn seed(projection: &CatalogProjection, name: &str, slug: &str, cents: i64) -> ProductId {
        let id = ProductId::new(AggregateId::new());
        let event = ProductEvent::ProductCreated(ProductCreated {
            product_id: id,
            details: details(name, slug, cents),
            variants: Vec::new(),
            occurred_at: Utc::now(),
        });
        projection.apply_envelope(&envelope(id, 1, &event)).unwrap();
        id
    }

    #[test]
    fn created_product_is_queryable_by_id_and_slug() {
        let projection = CatalogProjection::new();
        let id = seed(&projection, "Heritage Batik Scarf", "heritage-batik-scarf", 8_900);

        let row = projection.get(id).unwrap();
        assert_eq!(row.status, ProductStatus::Draft);
        assert_eq!(row.price, Money::from_cents(8_900));
        assert_eq!(
            projection.by_slug("heritage-batik-scarf").map(|r| r.product_id),
            Some(id)
        );
        assert!(projection.slug_taken("heritage-batik-scarf"));
    }

    #[test]
    fn update_moves_the_slug_index() {
        let projection = CatalogProjection::new();
        let id = seed(&projection, "Batik Scarf", "batik-scarf", 8_900);

        let event = ProductEvent::ProductUpdated(ProductUpdated {
            product_id: id,
            details: details("Batik Scarf", "batik-scarf-v2", 9_900),
            occurred_at: Utc::now(),
        });
        projection.apply_envelope(&envelope(id, 2, &event)).unwrap();

        assert!(!projection.slug_taken("batik-scarf"));
        assert_eq!(
            projection.by_slug("batik-scarf-v2").map(|r| r.price),
            Some(Money::from_cents(9_900))
        );
    }

    #[test]
    fn list_filters_by_search_and_sorts_by_price() {
        let projection = CatalogProjection::new();
        seed(&projection, "Batik Scarf", "batik-scarf", 8_900);
        seed(&projection, "Songket Shawl", "songket-shawl", 15_900);
        seed(&projection, "Batik Tote", "batik-tote", 5_900);

        let rows = projection.list(&ProductQuery {
            search: Some("batik".to_string()),
            sort: ProductSort::PriceAsc,
            ..ProductQuery::default()
        });
        assert_eq!(
            rows.iter().map(|r| r.slug.as_str()).collect::<Vec<_>>(),
            vec!["batik-tote", "batik-scarf"]
        );
    }

    #[test]
    fn popularity_sort_uses_view_counts() {
        let projection = CatalogProjection::new();
        let quiet = seed(&projection, "Batik Scarf", "batik-scarf", 8_900);
        let popular = seed(&projection, "Songket Shawl", "songket-shawl", 15_900);

        for seq in 2..=4 {
            let event = ProductEvent::ProductViewed(ProductViewed {
                product_id: popular,
                occurred_at: Utc::now(),
            });
            projection
                .apply_envelope(&envelope(popular, seq, &event))
                .unwrap();
        }

        let rows = projection.list(&ProductQuery {
            sort: ProductSort::Popularity,
            ..ProductQuery::default()
        });
        assert_eq!(rows[0].product_id, popular);
        assert_eq!(rows[1].product_id, quiet);
    }
}
