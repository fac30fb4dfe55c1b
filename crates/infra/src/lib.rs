//! Infrastructure layer: record store, configuration and the services that
//! read, decide and write through the store.

pub mod appointment_scheduler;
pub mod config;
pub mod error;
pub mod order_lifecycle;
pub mod store;

pub use appointment_scheduler::{AppointmentScheduler, BookingRequest};
pub use config::{ConfigError, WorkshopConfig};
pub use error::{ErrorKind, ServiceError};
pub use order_lifecycle::{NewOrder, OrderLifecycleManager};
pub use store::{DataStore, EntityKind, InMemoryDataStore, Repository, StoreError, StoredRecord};
