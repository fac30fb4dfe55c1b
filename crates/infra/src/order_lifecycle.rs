//! Order lifecycle service.
//!
//! Loads an order snapshot, applies a pure domain operation to it and writes
//! it back under an optimistic version check:
//!
//! ```text
//! load (NotFound) -> check caller's version (Conflict)
//!   -> transition / apply_change (InvalidTransition, Validation, NotFound)
//!   -> save with Exact(loaded version) (Conflict on a concurrent write)
//! ```
//!
//! Nothing is retried here; retries are the caller's policy.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use workshop_core::{AggregateRoot, Clock, ExpectedVersion, Money, OrderId, Percent};
use workshop_orders::{OpenOrder, Order, OrderChange, OrderPart, OrderService, OrderStatus};

use crate::config::WorkshopConfig;
use crate::error::ServiceError;
use crate::store::{DataStore, EntityKind, Repository, StoreError, StoredRecord};

impl StoredRecord for Order {
    const KIND: EntityKind = EntityKind::Orders;
}

const ORDER_SEQUENCE: &str = "orders";

/// Named monotonically increasing counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Sequence {
    id: String,
    value: u64,
    #[serde(default)]
    version: u64,
}

impl AggregateRoot for Sequence {
    type Id = String;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl StoredRecord for Sequence {
    const KIND: EntityKind = EntityKind::Sequences;
}

/// Request to open an order. Missing discount/tax fall back to configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewOrder {
    pub services: Vec<OrderService>,
    pub parts: Vec<OrderPart>,
    pub labor_cost: Money,
    pub discount: Option<Percent>,
    pub tax: Option<Percent>,
    pub technician: Option<String>,
}

/// Owns order status changes and the mutation paths of order financials.
#[derive(Debug)]
pub struct OrderLifecycleManager<S, C> {
    store: S,
    clock: C,
    config: WorkshopConfig,
}

impl<S, C> OrderLifecycleManager<S, C> {
    pub fn new(store: S, clock: C, config: WorkshopConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn into_parts(self) -> (S, C) {
        (self.store, self.clock)
    }
}

impl<S, C> OrderLifecycleManager<S, C>
where
    S: DataStore,
    C: Clock,
{
    fn orders(&self) -> Repository<'_, S, Order> {
        Repository::new(&self.store)
    }

    /// Open a new order with the next sequential number.
    ///
    /// The request is fully validated before a number is reserved, so a
    /// rejected request leaves no gap in the numbering.
    #[instrument(skip_all, err)]
    pub async fn create_order(&self, request: NewOrder) -> Result<Order, ServiceError> {
        let mut input = OpenOrder {
            id: OrderId::new(),
            number: 0,
            services: request.services,
            parts: request.parts,
            labor_cost: request.labor_cost,
            discount: request.discount.unwrap_or(self.config.default_discount),
            tax: request.tax.unwrap_or(self.config.default_tax),
            technician: request.technician,
            opened_at: self.clock.now(),
        };
        input.validate()?;
        input.number = self.next_order_number().await?;
        let order = Order::open(input)?;

        let stored = self.orders().insert(&order).await?;
        info!(
            order_id = %stored.id_typed(),
            number = stored.number(),
            total = %stored.totals().total.round_cents(),
            "order created"
        );
        Ok(stored)
    }

    /// Load an order. Stored totals that disagree with the order's inputs are
    /// recomputed; the corrected figures are persisted by the next write.
    pub async fn get_order(&self, id: OrderId) -> Result<Order, ServiceError> {
        let order = self
            .orders()
            .find(&id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                kind: "order",
                id: id.to_string(),
            })?;
        reconcile_totals(order)
    }

    /// All orders, ascending by number.
    pub async fn list_orders(&self) -> Result<Vec<Order>, ServiceError> {
        let mut orders = self
            .orders()
            .all()
            .await?
            .into_iter()
            .map(reconcile_totals)
            .collect::<Result<Vec<_>, _>>()?;
        orders.sort_by_key(Order::number);
        Ok(orders)
    }

    /// Move an order to `target`.
    ///
    /// Fails with `InvalidTransition` for any pair outside the status table,
    /// `Conflict` when the order is not at `expected` or was written
    /// concurrently, and `NotFound` for an unknown id.
    #[instrument(skip_all, fields(order_id = %id, to = %target), err)]
    pub async fn transition(
        &self,
        id: OrderId,
        expected: ExpectedVersion,
        target: OrderStatus,
        actor: Option<String>,
        note: Option<String>,
    ) -> Result<Order, ServiceError> {
        let mut order = self.get_order(id).await?;
        let loaded = order.version();
        expected.check(loaded)?;

        let from = order.status();
        order.transition(target, actor, note, self.clock.now())?;

        let stored = self.orders().save(&order, ExpectedVersion::Exact(loaded)).await?;
        info!(
            order_id = %id,
            number = stored.number(),
            from = %from,
            to = %target,
            version = stored.version(),
            "order status changed"
        );
        Ok(stored)
    }

    /// Apply a line-item, financial or assignment change and recompute totals.
    #[instrument(skip_all, fields(order_id = %id, change = change.name()), err)]
    pub async fn apply_change(
        &self,
        id: OrderId,
        expected: ExpectedVersion,
        change: OrderChange,
    ) -> Result<Order, ServiceError> {
        let mut order = self.get_order(id).await?;
        let loaded = order.version();
        expected.check(loaded)?;

        let name = change.name();
        order.apply_change(change, self.clock.now())?;

        let stored = self.orders().save(&order, ExpectedVersion::Exact(loaded)).await?;
        debug!(
            order_id = %id,
            change = name,
            subtotal = %stored.totals().subtotal.round_cents(),
            total = %stored.totals().total.round_cents(),
            version = stored.version(),
            "order updated"
        );
        Ok(stored)
    }

    /// Reserve the next order number.
    ///
    /// Two concurrent creations never share a number: the loser of the
    /// counter bump gets `Conflict`.
    async fn next_order_number(&self) -> Result<u64, ServiceError> {
        let current = match self.sequences().find(&ORDER_SEQUENCE.to_string()).await? {
            Some(seq) => seq,
            None => self.seed_sequence().await?,
        };
        self.reserve(current).await
    }

    fn sequences(&self) -> Repository<'_, S, Sequence> {
        Repository::new(&self.store)
    }

    /// Create the counter, seeded from the highest number already stored (or
    /// the configured first number). A concurrent seeder's counter wins.
    async fn seed_sequence(&self) -> Result<Sequence, ServiceError> {
        let key = ORDER_SEQUENCE.to_string();
        let highest = self
            .orders()
            .all()
            .await?
            .iter()
            .map(Order::number)
            .max()
            .unwrap_or(0);
        let seed = Sequence {
            id: key.clone(),
            value: highest.max(self.config.first_order_number.saturating_sub(1)),
            version: 0,
        };
        match self.sequences().insert(&seed).await {
            Ok(seq) => Ok(seq),
            Err(StoreError::Duplicate { .. }) => self.sequences().find(&key).await?.ok_or_else(|| {
                ServiceError::Conflict("order number sequence was reset concurrently".to_string())
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Bump the counter read earlier; fails if anyone else bumped it since.
    async fn reserve(&self, current: Sequence) -> Result<u64, ServiceError> {
        let next = Sequence {
            value: current.value + 1,
            ..current.clone()
        };
        match self
            .sequences()
            .save(&next, ExpectedVersion::Exact(current.version))
            .await
        {
            Ok(_) => Ok(next.value),
            Err(StoreError::Concurrency(_)) => Err(ServiceError::Conflict(
                "order number was reserved concurrently; retry".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

fn reconcile_totals(mut order: Order) -> Result<Order, ServiceError> {
    if !order.totals_are_consistent() {
        warn!(
            order_id = %order.id_typed(),
            number = order.number(),
            "stored totals disagree with order inputs; recomputing"
        );
        order.recompute_totals()?;
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeDelta, Utc};
    use rust_decimal_macros::dec;
    use serde_json::Value as JsonValue;

    use workshop_core::FixedClock;

    use crate::error::ErrorKind;
    use crate::store::InMemoryDataStore;

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-06-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn setup() -> (
        OrderLifecycleManager<Arc<InMemoryDataStore>, Arc<FixedClock>>,
        Arc<InMemoryDataStore>,
        Arc<FixedClock>,
    ) {
        let store = Arc::new(InMemoryDataStore::new());
        let clock = Arc::new(FixedClock::new(start()));
        let manager =
            OrderLifecycleManager::new(store.clone(), clock.clone(), WorkshopConfig::default());
        (manager, store, clock)
    }

    fn scenario_order() -> NewOrder {
        NewOrder {
            services: vec![OrderService::new("Brake service", Money::new(dec!(100)), 2).unwrap()],
            parts: vec![OrderPart::new("Brake fluid", Money::new(dec!(50)), 1).unwrap()],
            labor_cost: Money::new(dec!(30)),
            discount: Some(Percent::new(dec!(10)).unwrap()),
            tax: Some(Percent::new(dec!(5)).unwrap()),
            technician: Some("M1".into()),
        }
    }

    #[tokio::test]
    async fn create_order_persists_derived_totals() {
        let (manager, _, _) = setup();
        let order = manager.create_order(scenario_order()).await.unwrap();

        assert_eq!(order.number(), 1);
        assert_eq!(order.status(), OrderStatus::Open);
        assert_eq!(order.version(), 1);
        assert_eq!(order.totals().subtotal, Money::new(dec!(280)));
        assert_eq!(order.totals().discount_amount, Money::new(dec!(28)));
        assert_eq!(order.totals().tax_amount, Money::new(dec!(12.6)));
        assert_eq!(order.totals().total, Money::new(dec!(264.6)));
        assert_eq!(order.created_at(), start());

        let loaded = manager.get_order(order.id_typed()).await.unwrap();
        assert_eq!(loaded, order);
    }

    #[tokio::test]
    async fn order_numbers_are_sequential() {
        let (manager, _, _) = setup();
        let mut numbers = Vec::new();
        for _ in 0..3 {
            numbers.push(manager.create_order(NewOrder::default()).await.unwrap().number());
        }
        assert_eq!(numbers, vec![1, 2, 3]);

        let listed: Vec<u64> = manager
            .list_orders()
            .await
            .unwrap()
            .iter()
            .map(Order::number)
            .collect();
        assert_eq!(listed, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn rejected_create_does_not_consume_a_number() {
        let (manager, _, _) = setup();
        let err = manager
            .create_order(NewOrder {
                labor_cost: Money::new(dec!(-5)),
                ..NewOrder::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let order = manager.create_order(NewOrder::default()).await.unwrap();
        assert_eq!(order.number(), 1);
    }

    #[tokio::test]
    async fn stale_sequence_reservation_is_a_conflict() {
        let (manager, _, _) = setup();
        // A first caller reads the counter and is overtaken by a full create.
        let stale = manager.seed_sequence().await.unwrap();
        let winner = manager.create_order(NewOrder::default()).await.unwrap();
        assert_eq!(winner.number(), 1);

        let err = manager.reserve(stale).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let next = manager.create_order(NewOrder::default()).await.unwrap();
        assert_eq!(next.number(), 2);
    }

    #[tokio::test]
    async fn concurrent_seeding_keeps_the_existing_counter() {
        let (manager, _, _) = setup();
        manager.seed_sequence().await.unwrap();
        manager.create_order(NewOrder::default()).await.unwrap();

        // A second seeder that missed the counter gets the stored one back.
        let seq = manager.seed_sequence().await.unwrap();
        assert_eq!(seq.value, 1);
        assert_eq!(seq.version, 2);
    }

    #[tokio::test]
    async fn tampered_totals_are_recomputed_on_load() {
        let (manager, store, _) = setup();
        let order = manager.create_order(scenario_order()).await.unwrap();
        let id = order.id_typed();
        store
            .update(
                EntityKind::Orders,
                &id.to_string(),
                serde_json::json!({"total": "1", "subtotal": "1"}),
                ExpectedVersion::Any,
            )
            .await
            .unwrap();

        let loaded = manager.get_order(id).await.unwrap();
        assert!(loaded.totals_are_consistent());
        assert_eq!(loaded.totals(), order.totals());
        assert_eq!(manager.list_orders().await.unwrap()[0].totals(), order.totals());

        manager
            .transition(id, ExpectedVersion::Exact(2), OrderStatus::InProgress, None, None)
            .await
            .unwrap();
        let raw = store
            .get_by_id(EntityKind::Orders, &id.to_string())
            .await
            .unwrap()
            .unwrap();
        let persisted: Order = serde_json::from_value(raw).unwrap();
        assert!(persisted.totals_are_consistent());
        assert_eq!(persisted.totals().total, Money::new(dec!(264.6)));
    }

    #[tokio::test]
    async fn configured_defaults_apply_to_new_orders() {
        let store = Arc::new(InMemoryDataStore::new());
        let clock = Arc::new(FixedClock::new(start()));
        let config = WorkshopConfig {
            first_order_number: 500,
            default_tax: Percent::new(dec!(23)).unwrap(),
            default_discount: Percent::ZERO,
        };
        let manager = OrderLifecycleManager::new(store, clock, config);

        let order = manager
            .create_order(NewOrder {
                labor_cost: Money::new(dec!(100)),
                ..NewOrder::default()
            })
            .await
            .unwrap();
        assert_eq!(order.number(), 500);
        assert_eq!(order.totals().total, Money::new(dec!(123)));
    }

    #[tokio::test]
    async fn transition_records_history_and_completion() {
        let (manager, _, clock) = setup();
        let order = manager.create_order(scenario_order()).await.unwrap();
        let id = order.id_typed();

        let order = manager
            .transition(
                id,
                ExpectedVersion::Exact(1),
                OrderStatus::InProgress,
                Some("ana".into()),
                None,
            )
            .await
            .unwrap();
        assert_eq!(order.version(), 2);

        clock.advance(TimeDelta::hours(2));
        let order = manager
            .transition(
                id,
                ExpectedVersion::Exact(2),
                OrderStatus::Completed,
                Some("ana".into()),
                Some("road tested".into()),
            )
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Completed);
        assert_eq!(order.completed_at(), Some(start() + TimeDelta::hours(2)));
        assert_eq!(order.status_history().len(), 2);
        let last = &order.status_history()[1];
        assert_eq!(last.status, OrderStatus::Completed);
        assert_eq!(last.user.as_deref(), Some("ana"));
        assert_eq!(last.notes.as_deref(), Some("road tested"));
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected_and_nothing_is_written() {
        let (manager, _, _) = setup();
        let order = manager.create_order(scenario_order()).await.unwrap();
        let id = order.id_typed();
        manager
            .transition(id, ExpectedVersion::Any, OrderStatus::InProgress, None, None)
            .await
            .unwrap();
        manager
            .transition(id, ExpectedVersion::Any, OrderStatus::WaitingParts, None, None)
            .await
            .unwrap();

        let err = manager
            .transition(id, ExpectedVersion::Any, OrderStatus::Completed, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        let current = manager.get_order(id).await.unwrap();
        assert_eq!(current.status(), OrderStatus::WaitingParts);
        assert_eq!(current.version(), 3);
        assert_eq!(current.status_history().len(), 2);
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let (manager, _, _) = setup();
        let order = manager.create_order(scenario_order()).await.unwrap();
        let id = order.id_typed();

        manager
            .transition(id, ExpectedVersion::Exact(1), OrderStatus::InProgress, None, None)
            .await
            .unwrap();
        // A second caller still holding version 1.
        let err = manager
            .transition(id, ExpectedVersion::Exact(1), OrderStatus::Canceled, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let (manager, _, _) = setup();
        let err = manager
            .transition(OrderId::new(), ExpectedVersion::Any, OrderStatus::InProgress, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn changes_keep_totals_consistent_in_the_store() {
        let (manager, store, _) = setup();
        let order = manager.create_order(scenario_order()).await.unwrap();
        let id = order.id_typed();

        let extra = OrderPart::new("Pads", Money::new(dec!(20)), 3).unwrap();
        let order = manager
            .apply_change(id, ExpectedVersion::Exact(1), OrderChange::AddPart(extra))
            .await
            .unwrap();
        assert_eq!(order.totals().subtotal, Money::new(dec!(340)));

        let order = manager
            .apply_change(id, ExpectedVersion::Exact(2), OrderChange::SetTax(Percent::ZERO))
            .await
            .unwrap();
        assert_eq!(order.totals().total, Money::new(dec!(306)));

        let raw = store
            .get_by_id(EntityKind::Orders, &id.to_string())
            .await
            .unwrap()
            .unwrap();
        let reloaded: Order = serde_json::from_value(raw).unwrap();
        assert!(reloaded.totals_are_consistent());
        assert_eq!(reloaded.totals(), order.totals());
    }

    #[tokio::test]
    async fn invalid_change_is_a_validation_error() {
        let (manager, _, _) = setup();
        let order = manager.create_order(scenario_order()).await.unwrap();
        let service_id = order.services()[0].id;

        let err = manager
            .apply_change(
                order.id_typed(),
                ExpectedVersion::Any,
                OrderChange::UpdateServiceQuantity {
                    id: service_id,
                    quantity: 0,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(manager.get_order(order.id_typed()).await.unwrap().version(), 1);
    }

    /// Store whose writes always fail, to check outages surface unchanged.
    struct ReadOnlyStore(InMemoryDataStore);

    #[async_trait]
    impl DataStore for ReadOnlyStore {
        async fn get_all(&self, kind: EntityKind) -> Result<Vec<JsonValue>, StoreError> {
            self.0.get_all(kind).await
        }

        async fn get_by_id(
            &self,
            kind: EntityKind,
            id: &str,
        ) -> Result<Option<JsonValue>, StoreError> {
            self.0.get_by_id(kind, id).await
        }

        async fn insert(
            &self,
            _kind: EntityKind,
            _record: JsonValue,
        ) -> Result<JsonValue, StoreError> {
            Err(StoreError::Unavailable("read-only replica".to_string()))
        }

        async fn update(
            &self,
            _kind: EntityKind,
            _id: &str,
            _partial: JsonValue,
            _expected: ExpectedVersion,
        ) -> Result<JsonValue, StoreError> {
            Err(StoreError::Unavailable("read-only replica".to_string()))
        }

        async fn query(
            &self,
            kind: EntityKind,
            predicate: &(dyn for<'r> Fn(&'r JsonValue) -> bool + Send + Sync),
        ) -> Result<Vec<JsonValue>, StoreError> {
            self.0.query(kind, predicate).await
        }
    }

    #[tokio::test]
    async fn store_outage_propagates_to_the_caller() {
        let manager = OrderLifecycleManager::new(
            ReadOnlyStore(InMemoryDataStore::new()),
            FixedClock::new(start()),
            WorkshopConfig::default(),
        );
        let err = manager.create_order(NewOrder::default()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::Unavailable(_))));
    }
}
