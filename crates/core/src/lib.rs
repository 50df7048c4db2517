//! Pure domain primitives shared by every module: identifiers, money,
//! errors and the aggregate contract. No infrastructure concerns live here.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, CustomerId};
pub use money::Money;
