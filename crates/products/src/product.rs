use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reweave_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money};
use reweave_events::Event;

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Variant identifier (size/colour rows under a product).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(pub AggregateId);

impl VariantId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for VariantId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Draft,
    Active,
    Archived,
}

/// A sellable variant of the product (size, colour). Variants share the
/// product's price unless they carry an override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub variant_id: VariantId,
    pub sku: String,
    pub name: String,
    pub price_override: Option<Money>,
}

/// Mutable catalog fields, updated as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: Money,
    pub category: String,
    pub tags: Vec<String>,
    pub is_preorder: bool,
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    details: ProductDetails,
    variants: Vec<Variant>,
    status: ProductStatus,
    view_count: u64,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            details: ProductDetails {
                name: String::new(),
                slug: String::new(),
                description: String::new(),
                price: Money::ZERO,
                category: String::new(),
                tags: Vec::new(),
                is_preorder: false,
            },
            variants: Vec::new(),
            status: ProductStatus::Draft,
            view_count: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn details(&self) -> &ProductDetails {
        &self.details
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn variant(&self, variant_id: VariantId) -> Option<&Variant> {
        self.variants.iter().find(|v| v.variant_id == variant_id)
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn view_count(&self) -> u64 {
        self.view_count
    }

    pub fn is_preorder(&self) -> bool {
        self.details.is_preorder
    }

    /// Effective unit price for a variant, falling back to the product price.
    pub fn price_for(&self, variant_id: Option<VariantId>) -> Money {
        variant_id
            .and_then(|id| self.variant(id))
            .and_then(|v| v.price_override)
            .unwrap_or(self.details.price)
    }

    /// Only active products can be added to carts or sold.
    pub fn can_be_sold(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub variants: Vec<Variant>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProduct. Replaces the catalog fields wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ActivateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateProduct {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ArchiveProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveProduct {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordView. Bumps the popularity counter on a detail-page hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordView {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProduct(UpdateProduct),
    ActivateProduct(ActivateProduct),
    ArchiveProduct(ArchiveProduct),
    RecordView(RecordView),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub variants: Vec<Variant>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductActivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductActivated {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductArchived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductArchived {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductViewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductViewed {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductUpdated(ProductUpdated),
    ProductActivated(ProductActivated),
    ProductArchived(ProductArchived),
    ProductViewed(ProductViewed),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::ProductUpdated(_) => "products.product.updated",
            ProductEvent::ProductActivated(_) => "products.product.activated",
            ProductEvent::ProductArchived(_) => "products.product.archived",
            ProductEvent::ProductViewed(_) => "products.product.viewed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductUpdated(e) => e.occurred_at,
            ProductEvent::ProductActivated(e) => e.occurred_at,
            ProductEvent::ProductArchived(e) => e.occurred_at,
            ProductEvent::ProductViewed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.details = e.details.clone();
                self.variants = e.variants.clone();
                self.status = ProductStatus::Draft;
                self.view_count = 0;
                self.created = true;
            }
            ProductEvent::ProductUpdated(e) => {
                self.details = e.details.clone();
            }
            ProductEvent::ProductActivated(_) => {
                self.status = ProductStatus::Active;
            }
            ProductEvent::ProductArchived(_) => {
                self.status = ProductStatus::Archived;
            }
            ProductEvent::ProductViewed(_) => {
                self.view_count += 1;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProduct(cmd) => self.handle_update(cmd),
            ProductCommand::ActivateProduct(cmd) => self.handle_activate(cmd),
            ProductCommand::ArchiveProduct(cmd) => self.handle_archive(cmd),
            ProductCommand::RecordView(cmd) => self.handle_record_view(cmd),
        }
    }
}

fn validate_details(details: &ProductDetails) -> Result<(), DomainError> {
    if details.name.trim().is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    if details.slug.trim().is_empty() {
        return Err(DomainError::validation("slug cannot be empty"));
    }
    if !details
        .slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(DomainError::validation(
            "slug must be lowercase alphanumeric with hyphens",
        ));
    }
    if details.price < Money::ZERO {
        return Err(DomainError::validation("price cannot be negative"));
    }
    Ok(())
}

impl Product {
    fn ensure_exists(&self, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        validate_details(&cmd.details)?;
        for variant in &cmd.variants {
            if variant.sku.trim().is_empty() {
                return Err(DomainError::validation("variant SKU cannot be empty"));
            }
        }

        // Slug uniqueness across the catalog is enforced by the read model
        // before dispatch; the aggregate only sees its own stream.

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            details: cmd.details.clone(),
            variants: cmd.variants.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;
        if self.status == ProductStatus::Archived {
            return Err(DomainError::invalid_state("archived products cannot be updated"));
        }
        validate_details(&cmd.details)?;

        Ok(vec![ProductEvent::ProductUpdated(ProductUpdated {
            product_id: cmd.product_id,
            details: cmd.details.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;

        if self.status == ProductStatus::Active {
            return Err(DomainError::conflict("product is already active"));
        }
        if self.status == ProductStatus::Archived {
            return Err(DomainError::invalid_state(
                "archived products cannot be activated",
            ));
        }

        Ok(vec![ProductEvent::ProductActivated(ProductActivated {
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;

        if self.status == ProductStatus::Archived {
            return Err(DomainError::conflict("product is already archived"));
        }

        Ok(vec![ProductEvent::ProductArchived(ProductArchived {
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_view(&self, cmd: &RecordView) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists(cmd.product_id)?;

        Ok(vec![ProductEvent::ProductViewed(ProductViewed {
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_details() -> ProductDetails {
        ProductDetails {
            name: "Heritage Batik Scarf".to_string(),
            slug: "heritage-batik-scarf".to_string(),
            description: "Hand-dyed batik".to_string(),
            price: Money::from_cents(8_900),
            category: "scarves".to_string(),
            tags: vec!["batik".to_string()],
            is_preorder: false,
        }
    }

    fn created_product() -> Product {
        let id = test_product_id();
        let mut product = Product::empty(id);
        let events = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                product_id: id,
                details: test_details(),
                variants: vec![Variant {
                    variant_id: VariantId::new(AggregateId::new()),
                    sku: "SCARF-M".to_string(),
                    name: "Medium".to_string(),
                    price_override: None,
                }],
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
        product
    }

    #[test]
    fn create_product_emits_product_created_event() {
        let id = test_product_id();
        let product = Product::empty(id);
        let events = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                product_id: id,
                details: test_details(),
                variants: Vec::new(),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            ProductEvent::ProductCreated(e) => {
                assert_eq!(e.product_id, id);
                assert_eq!(e.details.slug, "heritage-batik-scarf");
            }
            _ => panic!("Expected ProductCreated event"),
        }
    }

    #[test]
    fn create_product_rejects_bad_slug() {
        let id = test_product_id();
        let product = Product::empty(id);
        let mut details = test_details();
        details.slug = "Not A Slug".to_string();

        let err = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                product_id: id,
                details,
                variants: Vec::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_replaces_details() {
        let mut product = created_product();
        let mut details = test_details();
        details.price = Money::from_cents(9_900);
        details.is_preorder = true;

        let events = product
            .handle(&ProductCommand::UpdateProduct(UpdateProduct {
                product_id: product.id_typed(),
                details,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);

        assert_eq!(product.details().price, Money::from_cents(9_900));
        assert!(product.is_preorder());
    }

    #[test]
    fn archived_product_rejects_update() {
        let mut product = created_product();
        let events = product
            .handle(&ProductCommand::ArchiveProduct(ArchiveProduct {
                product_id: product.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);

        let err = product
            .handle(&ProductCommand::UpdateProduct(UpdateProduct {
                product_id: product.id_typed(),
                details: test_details(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn activate_then_archive_walks_the_lifecycle() {
        let mut product = created_product();
        assert_eq!(product.status(), ProductStatus::Draft);
        assert!(!product.can_be_sold());

        let events = product
            .handle(&ProductCommand::ActivateProduct(ActivateProduct {
                product_id: product.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
        assert!(product.can_be_sold());

        let events = product
            .handle(&ProductCommand::ArchiveProduct(ArchiveProduct {
                product_id: product.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
        assert_eq!(product.status(), ProductStatus::Archived);
        assert!(!product.can_be_sold());
    }

    #[test]
    fn archived_product_cannot_be_activated() {
        let mut product = created_product();
        let events = product
            .handle(&ProductCommand::ArchiveProduct(ArchiveProduct {
                product_id: product.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);

        let err = product
            .handle(&ProductCommand::ActivateProduct(ActivateProduct {
                product_id: product.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn record_view_bumps_counter() {
        let mut product = created_product();
        for _ in 0..3 {
            let events = product
                .handle(&ProductCommand::RecordView(RecordView {
                    product_id: product.id_typed(),
                    occurred_at: test_time(),
                }))
                .unwrap();
            product.apply(&events[0]);
        }
        assert_eq!(product.view_count(), 3);
    }

    #[test]
    fn price_for_prefers_variant_override() {
        let id = test_product_id();
        let variant_id = VariantId::new(AggregateId::new());
        let mut product = Product::empty(id);
        let events = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                product_id: id,
                details: test_details(),
                variants: vec![Variant {
                    variant_id,
                    sku: "SCARF-XL".to_string(),
                    name: "Extra Large".to_string(),
                    price_override: Some(Money::from_cents(10_900)),
                }],
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);

        assert_eq!(product.price_for(Some(variant_id)), Money::from_cents(10_900));
        assert_eq!(product.price_for(None), Money::from_cents(8_900));
        // Unknown variants fall back to the product price.
        assert_eq!(
            product.price_for(Some(VariantId::new(AggregateId::new()))),
            Money::from_cents(8_900)
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: apply over the same event sequence always yields the
        /// same state.
        #[test]
        fn apply_is_deterministic(views in 0usize..20) {
            let id = test_product_id();
            let mut events = vec![ProductEvent::ProductCreated(ProductCreated {
                product_id: id,
                details: test_details(),
                variants: Vec::new(),
                occurred_at: Utc::now(),
            })];
            for _ in 0..views {
                events.push(ProductEvent::ProductViewed(ProductViewed {
                    product_id: id,
                    occurred_at: Utc::now(),
                }));
            }

            let mut a = Product::empty(id);
            let mut b = Product::empty(id);
            for event in &events {
                a.apply(event);
                b.apply(event);
            }

            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a.view_count(), views as u64);
            prop_assert_eq!(a.version(), events.len() as u64);
        }
    }
}
