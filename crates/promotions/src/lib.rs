//! Promotions domain module (event-sourced).
//!
//! Discount codes and the loyalty points programme. Pure domain logic
//! (no IO, no HTTP, no storage).

pub mod discount;
pub mod loyalty;

pub use discount::{
    CodeCreated, CodeDeactivated, CodeRedeemed, CreateCode, Deactivate, DiscountCode,
    DiscountCodeId, DiscountCommand, DiscountEvent, DiscountKind, Redeem,
};
pub use loyalty::{
    points_for_order, AccountOpened, AwardPoints, LoyaltyAccount, LoyaltyAccountId,
    LoyaltyCommand, LoyaltyEvent, OpenAccount, PointsAwarded, PointsRedeemed, RedeemPoints, Tier,
};
