//! Service orders domain module.
//!
//! Business rules for workshop orders, implemented as deterministic domain
//! logic (no IO, no storage): the status transition table, the totals
//! calculator and the order record itself.

pub mod finance;
pub mod order;
pub mod status;

pub use finance::{PricedLine, Totals, compute};
pub use order::{OpenOrder, Order, OrderChange, OrderPart, OrderService, StatusHistoryEntry};
pub use status::OrderStatus;
