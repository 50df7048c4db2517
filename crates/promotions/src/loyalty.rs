use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use reweave_core::{Aggregate, AggregateId, AggregateRoot, CustomerId, DomainError, Money};
use reweave_events::Event;

/// Loyalty account identifier. One account per customer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoyaltyAccountId(pub AggregateId);

impl LoyaltyAccountId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LoyaltyAccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Loyalty tiers, ordered by lifetime points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl Tier {
    pub fn multiplier(self) -> f64 {
        match self {
            Tier::Bronze => 1.0,
            Tier::Silver => 1.2,
            Tier::Gold => 1.5,
            Tier::Platinum => 2.0,
            Tier::Diamond => 2.5,
        }
    }

    /// Lifetime points needed to reach the tier.
    pub fn threshold(self) -> i64 {
        match self {
            Tier::Bronze => 0,
            Tier::Silver => 1_000,
            Tier::Gold => 5_000,
            Tier::Platinum => 10_000,
            Tier::Diamond => 25_000,
        }
    }

    pub fn for_lifetime_points(lifetime: i64) -> Tier {
        [Tier::Diamond, Tier::Platinum, Tier::Gold, Tier::Silver]
            .into_iter()
            .find(|t| lifetime >= t.threshold())
            .unwrap_or(Tier::Bronze)
    }
}

/// Points earned for an order: floor of the whole-ringgit total times the
/// tier multiplier.
pub fn points_for_order(total: Money, tier: Tier) -> i64 {
    let base = total.major_floor().max(0);
    ((base as f64) * tier.multiplier()).floor() as i64
}

/// Aggregate root: LoyaltyAccount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoyaltyAccount {
    id: LoyaltyAccountId,
    customer_id: CustomerId,
    points_balance: i64,
    lifetime_points: i64,
    tier: Tier,
    version: u64,
    created: bool,
}

impl LoyaltyAccount {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: LoyaltyAccountId) -> Self {
        Self {
            id,
            customer_id: CustomerId::from_uuid(uuid::Uuid::nil()),
            points_balance: 0,
            lifetime_points: 0,
            tier: Tier::Bronze,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LoyaltyAccountId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn points_balance(&self) -> i64 {
        self.points_balance
    }

    pub fn lifetime_points(&self) -> i64 {
        self.lifetime_points
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }
}

impl AggregateRoot for LoyaltyAccount {
    type Id = LoyaltyAccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenAccount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccount {
    pub account_id: LoyaltyAccountId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AwardPoints. Issued after a successful payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardPoints {
    pub account_id: LoyaltyAccountId,
    pub order_id: AggregateId,
    pub points: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RedeemPoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemPoints {
    pub account_id: LoyaltyAccountId,
    pub points: i64,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoyaltyCommand {
    OpenAccount(OpenAccount),
    AwardPoints(AwardPoints),
    RedeemPoints(RedeemPoints),
}

/// Event: AccountOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOpened {
    pub account_id: LoyaltyAccountId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PointsAwarded. Points carry a one-year expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsAwarded {
    pub account_id: LoyaltyAccountId,
    pub order_id: AggregateId,
    pub points: i64,
    pub new_tier: Tier,
    pub expires_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PointsRedeemed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsRedeemed {
    pub account_id: LoyaltyAccountId,
    pub points: i64,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoyaltyEvent {
    AccountOpened(AccountOpened),
    PointsAwarded(PointsAwarded),
    PointsRedeemed(PointsRedeemed),
}

impl Event for LoyaltyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LoyaltyEvent::AccountOpened(_) => "promotions.loyalty.opened",
            LoyaltyEvent::PointsAwarded(_) => "promotions.loyalty.points_awarded",
            LoyaltyEvent::PointsRedeemed(_) => "promotions.loyalty.points_redeemed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LoyaltyEvent::AccountOpened(e) => e.occurred_at,
            LoyaltyEvent::PointsAwarded(e) => e.occurred_at,
            LoyaltyEvent::PointsRedeemed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for LoyaltyAccount {
    type Command = LoyaltyCommand;
    type Event = LoyaltyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LoyaltyEvent::AccountOpened(e) => {
                self.id = e.account_id;
                self.customer_id = e.customer_id;
                self.points_balance = 0;
                self.lifetime_points = 0;
                self.tier = Tier::Bronze;
                self.created = true;
            }
            LoyaltyEvent::PointsAwarded(e) => {
                self.points_balance += e.points;
                self.lifetime_points += e.points;
                self.tier = e.new_tier;
            }
            LoyaltyEvent::PointsRedeemed(e) => {
                self.points_balance -= e.points;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LoyaltyCommand::OpenAccount(cmd) => self.handle_open(cmd),
            LoyaltyCommand::AwardPoints(cmd) => self.handle_award(cmd),
            LoyaltyCommand::RedeemPoints(cmd) => self.handle_redeem(cmd),
        }
    }
}

impl LoyaltyAccount {
    fn ensure_exists(&self, account_id: LoyaltyAccountId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != account_id {
            return Err(DomainError::invariant("account_id mismatch"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenAccount) -> Result<Vec<LoyaltyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("loyalty account already exists"));
        }
        Ok(vec![LoyaltyEvent::AccountOpened(AccountOpened {
            account_id: cmd.account_id,
            customer_id: cmd.customer_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_award(&self, cmd: &AwardPoints) -> Result<Vec<LoyaltyEvent>, DomainError> {
        self.ensure_exists(cmd.account_id)?;

        if cmd.points <= 0 {
            return Err(DomainError::validation("points must be positive"));
        }

        Ok(vec![LoyaltyEvent::PointsAwarded(PointsAwarded {
            account_id: cmd.account_id,
            order_id: cmd.order_id,
            points: cmd.points,
            new_tier: Tier::for_lifetime_points(self.lifetime_points + cmd.points),
            expires_at: cmd.occurred_at + Duration::days(365),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_redeem(&self, cmd: &RedeemPoints) -> Result<Vec<LoyaltyEvent>, DomainError> {
        self.ensure_exists(cmd.account_id)?;

        if cmd.points <= 0 {
            return Err(DomainError::validation("points must be positive"));
        }
        if cmd.points > self.points_balance {
            return Err(DomainError::validation("insufficient loyalty points"));
        }

        Ok(vec![LoyaltyEvent::PointsRedeemed(PointsRedeemed {
            account_id: cmd.account_id,
            points: cmd.points,
            description: cmd.description.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
