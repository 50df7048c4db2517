use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reweave_core::{Aggregate, AggregateId, AggregateRoot, CustomerId, DomainError, Money};
use reweave_events::Event;

/// Discount code identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscountCodeId(pub AggregateId);

impl DiscountCodeId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DiscountCodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// How the discount value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DiscountKind {
    /// Whole percent off the subtotal.
    Percentage(u32),
    /// Flat amount off.
    FixedAmount(Money),
}

/// Aggregate root: DiscountCode.
///
/// Pricing is pure ([`DiscountCode::price`]); redemption mutates usage
/// through the stream so the usage limit cannot be raced past.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountCode {
    id: DiscountCodeId,
    code: String,
    kind: DiscountKind,
    minimum_order_amount: Option<Money>,
    maximum_discount_amount: Option<Money>,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    usage_limit: Option<u64>,
    usage_count: u64,
    is_active: bool,
    version: u64,
    created: bool,
}

impl DiscountCode {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: DiscountCodeId) -> Self {
        Self {
            id,
            code: String::new(),
            kind: DiscountKind::FixedAmount(Money::ZERO),
            minimum_order_amount: None,
            maximum_discount_amount: None,
            starts_at: None,
            ends_at: None,
            usage_limit: None,
            usage_count: 0,
            is_active: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DiscountCodeId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn kind(&self) -> DiscountKind {
        self.kind
    }

    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    pub fn usage_limit(&self) -> Option<u64> {
        self.usage_limit
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    fn usage_exhausted(&self) -> bool {
        self.usage_limit
            .is_some_and(|limit| self.usage_count >= limit)
    }

    /// Validate the code against a subtotal and price the discount.
    ///
    /// Returns the discount amount, clamped to `maximum_discount_amount`
    /// and never more than the subtotal. Any validation failure is an error;
    /// checkout aborts rather than silently dropping the discount.
    pub fn price(&self, subtotal: Money, now: DateTime<Utc>) -> Result<Money, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if !self.is_active {
            return Err(DomainError::validation("discount code is not active"));
        }
        if let Some(starts_at) = self.starts_at {
            if now < starts_at {
                return Err(DomainError::validation("discount code is not yet valid"));
            }
        }
        if let Some(ends_at) = self.ends_at {
            if now > ends_at {
                return Err(DomainError::validation("discount code has expired"));
            }
        }
        if self.usage_exhausted() {
            return Err(DomainError::validation(
                "discount code usage limit reached",
            ));
        }
        if let Some(minimum) = self.minimum_order_amount {
            if subtotal < minimum {
                return Err(DomainError::validation(format!(
                    "order does not meet the {minimum} minimum for this code"
                )));
            }
        }

        let raw = match self.kind {
            DiscountKind::Percentage(percent) => subtotal.percentage(percent as f64),
            DiscountKind::FixedAmount(amount) => amount,
        };
        let capped = match self.maximum_discount_amount {
            Some(cap) => raw.min(cap),
            None => raw,
        };
        Ok(capped.min(subtotal))
    }
}

impl AggregateRoot for DiscountCode {
    type Id = DiscountCodeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateCode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCode {
    pub code_id: DiscountCodeId,
    pub code: String,
    pub kind: DiscountKind,
    pub minimum_order_amount: Option<Money>,
    pub maximum_discount_amount: Option<Money>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Redeem. Issued by checkout after the order is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redeem {
    pub code_id: DiscountCodeId,
    pub order_id: AggregateId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Deactivate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deactivate {
    pub code_id: DiscountCodeId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountCommand {
    CreateCode(CreateCode),
    Redeem(Redeem),
    Deactivate(Deactivate),
}

/// Event: CodeCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeCreated {
    pub code_id: DiscountCodeId,
    pub code: String,
    pub kind: DiscountKind,
    pub minimum_order_amount: Option<Money>,
    pub maximum_discount_amount: Option<Money>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CodeRedeemed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRedeemed {
    pub code_id: DiscountCodeId,
    pub order_id: AggregateId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CodeDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeDeactivated {
    pub code_id: DiscountCodeId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountEvent {
    CodeCreated(CodeCreated),
    CodeRedeemed(CodeRedeemed),
    CodeDeactivated(CodeDeactivated),
}

impl Event for DiscountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DiscountEvent::CodeCreated(_) => "promotions.discount.created",
            DiscountEvent::CodeRedeemed(_) => "promotions.discount.redeemed",
            DiscountEvent::CodeDeactivated(_) => "promotions.discount.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DiscountEvent::CodeCreated(e) => e.occurred_at,
            DiscountEvent::CodeRedeemed(e) => e.occurred_at,
            DiscountEvent::CodeDeactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for DiscountCode {
    type Command = DiscountCommand;
    type Event = DiscountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DiscountEvent::CodeCreated(e) => {
                self.id = e.code_id;
                self.code = e.code.clone();
                self.kind = e.kind;
                self.minimum_order_amount = e.minimum_order_amount;
                self.maximum_discount_amount = e.maximum_discount_amount;
                self.starts_at = e.starts_at;
                self.ends_at = e.ends_at;
                self.usage_limit = e.usage_limit;
                self.usage_count = 0;
                self.is_active = true;
                self.created = true;
            }
            DiscountEvent::CodeRedeemed(_) => {
                self.usage_count += 1;
            }
            DiscountEvent::CodeDeactivated(_) => {
                self.is_active = false;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DiscountCommand::CreateCode(cmd) => self.handle_create(cmd),
            DiscountCommand::Redeem(cmd) => self.handle_redeem(cmd),
            DiscountCommand::Deactivate(cmd) => self.handle_deactivate(cmd),
        }
    }
}

impl DiscountCode {
    fn handle_create(&self, cmd: &CreateCode) -> Result<Vec<DiscountEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("discount code already exists"));
        }
        let code = cmd.code.trim().to_uppercase();
        if code.is_empty() {
            return Err(DomainError::validation("code cannot be empty"));
        }
        match cmd.kind {
            DiscountKind::Percentage(percent) if percent == 0 || percent > 100 => {
                return Err(DomainError::validation("percentage must be in 1..=100"));
            }
            DiscountKind::FixedAmount(amount) if !amount.is_positive() => {
                return Err(DomainError::validation("fixed amount must be positive"));
            }
            _ => {}
        }
        if let (Some(starts_at), Some(ends_at)) = (cmd.starts_at, cmd.ends_at) {
            if ends_at <= starts_at {
                return Err(DomainError::validation("window must end after it starts"));
            }
        }

        Ok(vec![DiscountEvent::CodeCreated(CodeCreated {
            code_id: cmd.code_id,
            code,
            kind: cmd.kind,
            minimum_order_amount: cmd.minimum_order_amount,
            maximum_discount_amount: cmd.maximum_discount_amount,
            starts_at: cmd.starts_at,
            ends_at: cmd.ends_at,
            usage_limit: cmd.usage_limit,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_redeem(&self, cmd: &Redeem) -> Result<Vec<DiscountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if !self.is_active {
            return Err(DomainError::validation("discount code is not active"));
        }
        if self.usage_exhausted() {
            return Err(DomainError::validation(
                "discount code usage limit reached",
            ));
        }

        Ok(vec![DiscountEvent::CodeRedeemed(CodeRedeemed {
            code_id: cmd.code_id,
            order_id: cmd.order_id,
            customer_id: cmd.customer_id,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &Deactivate) -> Result<Vec<DiscountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if !self.is_active {
            return Err(DomainError::conflict("discount code is already inactive"));
        }

        Ok(vec![DiscountEvent::CodeDeactivated(CodeDeactivated {
            code_id: cmd.code_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_code_id() -> DiscountCodeId {
        DiscountCodeId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_code(kind: DiscountKind, cmd_mods: impl FnOnce(&mut CreateCode)) -> DiscountCode {
        let id = test_code_id();
        let mut code = DiscountCode::empty(id);
        let mut cmd = CreateCode {
            code_id: id,
            code: "raya10".to_string(),
            kind,
            minimum_order_amount: None,
            maximum_discount_amount: None,
            starts_at: None,
            ends_at: None,
            usage_limit: None,
            occurred_at: test_time(),
        };
        cmd_mods(&mut cmd);
        let events = code.handle(&DiscountCommand::CreateCode(cmd)).unwrap();
        code.apply(&events[0]);
        code
    }

    fn redeem(code: &mut DiscountCode, amount: Money) -> Result<(), DomainError> {
        let events = code.handle(&DiscountCommand::Redeem(Redeem {
            code_id: code.id_typed(),
            order_id: AggregateId::new(),
            customer_id: CustomerId::new(),
            amount,
            occurred_at: test_time(),
        }))?;
        for event in &events {
            code.apply(event);
        }
        Ok(())
    }

    #[test]
    fn code_is_stored_uppercased() {
        let code = created_code(DiscountKind::Percentage(10), |_| {});
        assert_eq!(code.code(), "RAYA10");
    }

    #[test]
    fn percentage_prices_against_subtotal() {
        let code = created_code(DiscountKind::Percentage(10), |_| {});
        let amount = code.price(Money::from_cents(25_000), test_time()).unwrap();
        assert_eq!(amount, Money::from_cents(2_500));
    }

    #[test]
    fn percentage_is_capped_by_maximum() {
        let code = created_code(DiscountKind::Percentage(50), |cmd| {
            cmd.maximum_discount_amount = Some(Money::from_cents(3_000));
        });
        let amount = code.price(Money::from_cents(25_000), test_time()).unwrap();
        assert_eq!(amount, Money::from_cents(3_000));
    }

    #[test]
    fn fixed_amount_never_exceeds_subtotal() {
        let code = created_code(DiscountKind::FixedAmount(Money::from_cents(5_000)), |_| {});
        let amount = code.price(Money::from_cents(2_000), test_time()).unwrap();
        assert_eq!(amount, Money::from_cents(2_000));
    }

    #[test]
    fn below_minimum_order_is_rejected() {
        let code = created_code(DiscountKind::Percentage(10), |cmd| {
            cmd.minimum_order_amount = Some(Money::from_cents(10_000));
        });
        let err = code
            .price(Money::from_cents(9_999), test_time())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn window_is_enforced() {
        let now = test_time();
        let code = created_code(DiscountKind::Percentage(10), |cmd| {
            cmd.starts_at = Some(now + Duration::days(1));
            cmd.ends_at = Some(now + Duration::days(10));
        });
        let err = code.price(Money::from_cents(10_000), now).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let amount = code
            .price(Money::from_cents(10_000), now + Duration::days(2))
            .unwrap();
        assert_eq!(amount, Money::from_cents(1_000));

        let err = code
            .price(Money::from_cents(10_000), now + Duration::days(11))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn usage_limit_blocks_pricing_and_redemption() {
        let mut code = created_code(DiscountKind::Percentage(10), |cmd| {
            cmd.usage_limit = Some(2);
        });
        redeem(&mut code, Money::from_cents(500)).unwrap();
        redeem(&mut code, Money::from_cents(500)).unwrap();
        assert_eq!(code.usage_count(), 2);

        let err = code
            .price(Money::from_cents(10_000), test_time())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = redeem(&mut code, Money::from_cents(500)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn deactivated_code_stops_pricing() {
        let mut code = created_code(DiscountKind::Percentage(10), |_| {});
        let events = code
            .handle(&DiscountCommand::Deactivate(Deactivate {
                code_id: code.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        code.apply(&events[0]);

        let err = code
            .price(Money::from_cents(10_000), test_time())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
