//! `workshop-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! errors, identifiers, versioning, money and time intervals.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod id;
pub mod interval;
pub mod money;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{AppointmentId, LineItemId, OrderId, ResourceId};
pub use interval::TimeInterval;
pub use money::{Money, Percent};
pub use value_object::ValueObject;
