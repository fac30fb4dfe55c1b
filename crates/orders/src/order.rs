use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use workshop_core::{AggregateRoot, DomainError, DomainResult, LineItemId, Money, OrderId, Percent};

use crate::finance::{self, PricedLine, Totals};
use crate::status::OrderStatus;

/// Labor line attached to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderService {
    pub id: LineItemId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    #[serde(default)]
    pub completed: bool,
}

impl OrderService {
    pub fn new(name: impl Into<String>, unit_price: Money, quantity: u32) -> DomainResult<Self> {
        let name = name.into();
        validate_line(&name, unit_price, quantity)?;
        Ok(Self {
            id: LineItemId::new(),
            name,
            unit_price,
            quantity,
            completed: false,
        })
    }

    fn priced(&self) -> PricedLine {
        PricedLine::new(self.unit_price, self.quantity)
    }
}

/// Part line attached to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPart {
    pub id: LineItemId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl OrderPart {
    pub fn new(name: impl Into<String>, unit_price: Money, quantity: u32) -> DomainResult<Self> {
        let name = name.into();
        validate_line(&name, unit_price, quantity)?;
        Ok(Self {
            id: LineItemId::new(),
            name,
            unit_price,
            quantity,
        })
    }

    fn priced(&self) -> PricedLine {
        PricedLine::new(self.unit_price, self.quantity)
    }
}

fn validate_line(name: &str, unit_price: Money, quantity: u32) -> DomainResult<()> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("line item name must not be blank"));
    }
    Money::non_negative(unit_price.amount(), "unit price")?;
    if quantity < 1 {
        return Err(DomainError::validation("quantity must be at least 1"));
    }
    Ok(())
}

fn ensure_unique_line_ids(ids: impl IntoIterator<Item = LineItemId>) -> DomainResult<()> {
    let mut seen = std::collections::HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(DomainError::validation(format!("duplicate line item id {id}")));
        }
    }
    Ok(())
}

/// One recorded status change. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub user: Option<String>,
    pub notes: Option<String>,
}

/// Input for opening a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOrder {
    pub id: OrderId,
    pub number: u64,
    pub services: Vec<OrderService>,
    pub parts: Vec<OrderPart>,
    pub labor_cost: Money,
    pub discount: Percent,
    pub tax: Percent,
    pub technician: Option<String>,
    pub opened_at: DateTime<Utc>,
}

impl OpenOrder {
    /// Check everything about a new order except its number.
    ///
    /// Returns the totals it would open with, so callers can reject a request
    /// before reserving a number for it.
    pub fn validate(&self) -> DomainResult<Totals> {
        for service in &self.services {
            validate_line(&service.name, service.unit_price, service.quantity)?;
        }
        for part in &self.parts {
            validate_line(&part.name, part.unit_price, part.quantity)?;
        }
        ensure_unique_line_ids(
            self.services
                .iter()
                .map(|s| s.id)
                .chain(self.parts.iter().map(|p| p.id)),
        )?;
        let lines = self
            .services
            .iter()
            .map(OrderService::priced)
            .chain(self.parts.iter().map(OrderPart::priced));
        finance::compute(lines, self.labor_cost, self.discount, self.tax)
    }
}

/// A mutation of an order's line items, financial inputs or assignment.
///
/// Every change goes through [`Order::apply_change`], which recomputes the
/// derived totals whenever a financial input moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderChange {
    AddService(OrderService),
    AddPart(OrderPart),
    RemoveService(LineItemId),
    RemovePart(LineItemId),
    UpdateServiceQuantity { id: LineItemId, quantity: u32 },
    UpdatePartQuantity { id: LineItemId, quantity: u32 },
    SetServiceCompleted { id: LineItemId, completed: bool },
    SetLaborCost(Money),
    SetDiscount(Percent),
    SetTax(Percent),
    AssignTechnician(Option<String>),
}

impl OrderChange {
    pub fn name(&self) -> &'static str {
        match self {
            OrderChange::AddService(_) => "add_service",
            OrderChange::AddPart(_) => "add_part",
            OrderChange::RemoveService(_) => "remove_service",
            OrderChange::RemovePart(_) => "remove_part",
            OrderChange::UpdateServiceQuantity { .. } => "update_service_quantity",
            OrderChange::UpdatePartQuantity { .. } => "update_part_quantity",
            OrderChange::SetServiceCompleted { .. } => "set_service_completed",
            OrderChange::SetLaborCost(_) => "set_labor_cost",
            OrderChange::SetDiscount(_) => "set_discount",
            OrderChange::SetTax(_) => "set_tax",
            OrderChange::AssignTechnician(_) => "assign_technician",
        }
    }
}

/// Aggregate root: a workshop service order.
///
/// `subtotal`, `discountAmount`, `taxAmount` and `total` are stored for cheap
/// reads but only ever written by [`Order::recompute_totals`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: OrderId,
    number: u64,
    status: OrderStatus,
    services: Vec<OrderService>,
    parts: Vec<OrderPart>,
    labor_cost: Money,
    discount: Percent,
    tax: Percent,
    subtotal: Money,
    discount_amount: Money,
    tax_amount: Money,
    total: Money,
    #[serde(default)]
    technician: Option<String>,
    #[serde(default)]
    status_history: Vec<StatusHistoryEntry>,
    completed_at: Option<DateTime<Utc>>,
    #[serde(rename = "created_at")]
    created_at: DateTime<Utc>,
    #[serde(rename = "updated_at")]
    updated_at: DateTime<Utc>,
    #[serde(default)]
    version: u64,
}

impl Order {
    /// Open a new order in status `open` with totals derived from its inputs.
    ///
    /// The version is 0 until the store accepts the first write.
    pub fn open(input: OpenOrder) -> DomainResult<Self> {
        if input.number == 0 {
            return Err(DomainError::validation("order number must be positive"));
        }
        let totals = input.validate()?;

        Ok(Self {
            id: input.id,
            number: input.number,
            status: OrderStatus::Open,
            services: input.services,
            parts: input.parts,
            labor_cost: input.labor_cost,
            discount: input.discount,
            tax: input.tax,
            subtotal: totals.subtotal,
            discount_amount: totals.discount_amount,
            tax_amount: totals.tax_amount,
            total: totals.total,
            technician: normalize_technician(input.technician),
            status_history: Vec::new(),
            completed_at: None,
            created_at: input.opened_at,
            updated_at: input.opened_at,
            version: 0,
        })
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn services(&self) -> &[OrderService] {
        &self.services
    }

    pub fn parts(&self) -> &[OrderPart] {
        &self.parts
    }

    pub fn labor_cost(&self) -> Money {
        self.labor_cost
    }

    pub fn discount(&self) -> Percent {
        self.discount
    }

    pub fn tax(&self) -> Percent {
        self.tax
    }

    pub fn totals(&self) -> Totals {
        Totals {
            subtotal: self.subtotal,
            discount_amount: self.discount_amount,
            tax_amount: self.tax_amount,
            total: self.total,
        }
    }

    pub fn technician(&self) -> Option<&str> {
        self.technician.as_deref()
    }

    /// The stored history exactly as appended.
    pub fn status_history(&self) -> &[StatusHistoryEntry] {
        &self.status_history
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// History for display, oldest first.
    ///
    /// An order with no recorded history shows a single entry for its creation
    /// in status `open`. Stored state is left untouched.
    pub fn history_view(&self) -> Vec<StatusHistoryEntry> {
        if self.status_history.is_empty() {
            return vec![StatusHistoryEntry {
                status: OrderStatus::Open,
                timestamp: self.created_at,
                user: None,
                notes: None,
            }];
        }
        let mut entries = self.status_history.clone();
        entries.sort_by_key(|entry| entry.timestamp);
        entries
    }

    /// Whether the stored derived figures match what the inputs produce.
    ///
    /// Records loaded from the store were written through this type, so this
    /// only fails for data edited behind the core's back.
    pub fn totals_are_consistent(&self) -> bool {
        self.compute_totals()
            .map(|totals| totals == self.totals())
            .unwrap_or(false)
    }

    /// Move to `target`, recording who did it and why.
    pub fn transition(
        &mut self,
        target: OrderStatus,
        user: Option<String>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.status.can_transition_to(target) {
            return Err(DomainError::invalid_transition(self.status, target));
        }

        self.status = target;
        self.completed_at = match target {
            OrderStatus::Completed => Some(now),
            _ => None,
        };
        self.status_history.push(StatusHistoryEntry {
            status: target,
            timestamp: now,
            user,
            notes,
        });
        self.updated_at = now;
        Ok(())
    }

    /// Apply a change atomically: on error the order is left as it was.
    pub fn apply_change(&mut self, change: OrderChange, now: DateTime<Utc>) -> DomainResult<()> {
        let mut next = self.clone();
        next.apply_unchecked(change)?;
        next.recompute_totals()?;
        next.updated_at = now;
        *self = next;
        Ok(())
    }

    /// Single entry point that writes the derived monetary fields.
    pub fn recompute_totals(&mut self) -> DomainResult<()> {
        let totals = self.compute_totals()?;
        self.subtotal = totals.subtotal;
        self.discount_amount = totals.discount_amount;
        self.tax_amount = totals.tax_amount;
        self.total = totals.total;
        Ok(())
    }

    fn compute_totals(&self) -> DomainResult<Totals> {
        let lines = self
            .services
            .iter()
            .map(OrderService::priced)
            .chain(self.parts.iter().map(OrderPart::priced));
        finance::compute(lines, self.labor_cost, self.discount, self.tax)
    }

    fn apply_unchecked(&mut self, change: OrderChange) -> DomainResult<()> {
        match change {
            OrderChange::AddService(service) => {
                validate_line(&service.name, service.unit_price, service.quantity)?;
                self.services.push(service);
                self.ensure_unique_line_ids()?;
            }
            OrderChange::AddPart(part) => {
                validate_line(&part.name, part.unit_price, part.quantity)?;
                self.parts.push(part);
                self.ensure_unique_line_ids()?;
            }
            OrderChange::RemoveService(id) => {
                let idx = self.service_index(id)?;
                self.services.remove(idx);
            }
            OrderChange::RemovePart(id) => {
                let idx = self.part_index(id)?;
                self.parts.remove(idx);
            }
            OrderChange::UpdateServiceQuantity { id, quantity } => {
                let idx = self.service_index(id)?;
                self.services[idx].quantity = quantity;
            }
            OrderChange::UpdatePartQuantity { id, quantity } => {
                let idx = self.part_index(id)?;
                self.parts[idx].quantity = quantity;
            }
            OrderChange::SetServiceCompleted { id, completed } => {
                let idx = self.service_index(id)?;
                self.services[idx].completed = completed;
            }
            OrderChange::SetLaborCost(cost) => {
                self.labor_cost = Money::non_negative(cost.amount(), "labor cost")?;
            }
            OrderChange::SetDiscount(discount) => self.discount = discount,
            OrderChange::SetTax(tax) => self.tax = tax,
            OrderChange::AssignTechnician(technician) => {
                self.technician = normalize_technician(technician);
            }
        }
        Ok(())
    }

    fn service_index(&self, id: LineItemId) -> DomainResult<usize> {
        self.services
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| DomainError::not_found("order service", id))
    }

    fn part_index(&self, id: LineItemId) -> DomainResult<usize> {
        self.parts
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| DomainError::not_found("order part", id))
    }

    fn ensure_unique_line_ids(&self) -> DomainResult<()> {
        ensure_unique_line_ids(
            self.services
                .iter()
                .map(|s| s.id)
                .chain(self.parts.iter().map(|p| p.id)),
        )
    }
}

fn normalize_technician(technician: Option<String>) -> Option<String> {
    technician
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
