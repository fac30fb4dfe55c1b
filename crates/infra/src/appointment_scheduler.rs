//! Appointment booking service.
//!
//! Each resource has a schedule record holding the reservations of its active
//! appointments. A booking checks the candidate slot against those
//! reservations and adds its own in one exact-version write, so the check and
//! the write cannot be split by a concurrent booking: of two callers that read
//! the same schedule, the second write fails with `Conflict`.
//!
//! The reservation is taken before the appointment record is written and
//! released after the record stops needing it. A failure in between can
//! leave a reservation without a record; that blocks time, it never
//! double-books it.

use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use workshop_core::{
    AggregateRoot, AppointmentId, Clock, ExpectedVersion, ResourceId, TimeInterval,
};
use workshop_scheduling::{
    Appointment, AppointmentStatus, Candidate, NewAppointment, Occupancy, days_with_appointments,
    ensure_available, for_date, for_resource_on,
};

use crate::error::ServiceError;
use crate::store::{DataStore, EntityKind, Repository, StoreError, StoredRecord};

impl StoredRecord for Appointment {
    const KIND: EntityKind = EntityKind::Appointments;
}

/// Attempts at dropping a reservation before leaving it in place.
const RELEASE_ATTEMPTS: usize = 3;

/// Time held on a resource by one appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Reservation {
    appointment_id: AppointmentId,
    resource_id: ResourceId,
    interval: TimeInterval,
}

impl Occupancy for Reservation {
    fn occupant(&self) -> AppointmentId {
        self.appointment_id
    }

    fn resource(&self) -> &ResourceId {
        &self.resource_id
    }

    fn span(&self) -> TimeInterval {
        self.interval
    }

    fn holds_resource(&self) -> bool {
        true
    }
}

/// Reservations of one resource, written under an exact-version check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ResourceSchedule {
    id: String,
    #[serde(rename = "resourceId")]
    resource_id: ResourceId,
    #[serde(default)]
    reservations: Vec<Reservation>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    version: u64,
}

impl AggregateRoot for ResourceSchedule {
    type Id = String;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl StoredRecord for ResourceSchedule {
    const KIND: EntityKind = EntityKind::ResourceSchedules;
}

/// Request to book a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub resource_id: ResourceId,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub client: Option<String>,
    pub vehicle: Option<String>,
    pub service: Option<String>,
    pub notes: Option<String>,
}

impl BookingRequest {
    pub fn new(
        resource_id: ResourceId,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            resource_id,
            start,
            end,
            client: None,
            vehicle: None,
            service: None,
            notes: None,
        }
    }
}

#[derive(Debug)]
pub struct AppointmentScheduler<S, C> {
    store: S,
    clock: C,
}

impl<S, C> AppointmentScheduler<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn into_parts(self) -> (S, C) {
        (self.store, self.clock)
    }
}

impl<S, C> AppointmentScheduler<S, C>
where
    S: DataStore,
    C: Clock,
{
    fn appointments(&self) -> Repository<'_, S, Appointment> {
        Repository::new(&self.store)
    }

    fn schedules(&self) -> Repository<'_, S, ResourceSchedule> {
        Repository::new(&self.store)
    }

    /// Book a slot. Fails with `Validation` for a non-positive duration and
    /// `Conflict` when the resource is taken for any part of the slot.
    #[instrument(skip_all, fields(resource_id = %request.resource_id), err)]
    pub async fn book(&self, request: BookingRequest) -> Result<Appointment, ServiceError> {
        let candidate = Candidate::new(request.resource_id, request.start, request.end)?;
        let appointment = Appointment::schedule(
            NewAppointment {
                id: AppointmentId::new(),
                resource_id: candidate.resource_id.clone(),
                interval: candidate.interval,
                client: request.client,
                vehicle: request.vehicle,
                service: request.service,
                notes: request.notes,
            },
            self.clock.now(),
        );
        let id = appointment.id_typed();

        let schedule = self.schedule(&candidate.resource_id).await?;
        self.reserve(schedule, &candidate, id).await?;

        let stored = match self.appointments().insert(&appointment).await {
            Ok(stored) => stored,
            Err(e) => {
                self.release(&candidate.resource_id, id, candidate.interval).await;
                return Err(e.into());
            }
        };
        info!(
            appointment_id = %id,
            resource_id = %stored.resource_id(),
            start = %stored.start().to_rfc3339(),
            end = %stored.end().to_rfc3339(),
            "appointment booked"
        );
        Ok(stored)
    }

    /// Move an appointment to a new slot on its resource.
    ///
    /// The old slot stays reserved until the moved record is saved, so it
    /// cannot be taken by someone else while the move may still fail.
    #[instrument(skip_all, fields(appointment_id = %id), err)]
    pub async fn reschedule(
        &self,
        id: AppointmentId,
        expected: ExpectedVersion,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Appointment, ServiceError> {
        let mut appointment = self.get_appointment(id).await?;
        let loaded = appointment.version();
        expected.check(loaded)?;

        let previous = appointment.interval();
        let candidate = Candidate::new(appointment.resource_id().clone(), start, end)?;
        appointment.reschedule(candidate.interval, self.clock.now())?;

        let schedule = self.schedule(&candidate.resource_id).await?;
        self.reserve(schedule, &candidate, id).await?;

        let saved = self
            .appointments()
            .save(&appointment, ExpectedVersion::Exact(loaded))
            .await;
        let stored = match saved {
            Ok(stored) => stored,
            Err(e) => {
                self.release(&candidate.resource_id, id, candidate.interval).await;
                return Err(e.into());
            }
        };
        self.release(&candidate.resource_id, id, previous).await;

        info!(
            appointment_id = %id,
            resource_id = %stored.resource_id(),
            start = %stored.start().to_rfc3339(),
            end = %stored.end().to_rfc3339(),
            "appointment rescheduled"
        );
        Ok(stored)
    }

    /// Advance an appointment's status. Cancelling releases its slot for good.
    #[instrument(skip_all, fields(appointment_id = %id, to = %status), err)]
    pub async fn set_status(
        &self,
        id: AppointmentId,
        expected: ExpectedVersion,
        status: AppointmentStatus,
    ) -> Result<Appointment, ServiceError> {
        let mut appointment = self.get_appointment(id).await?;
        let loaded = appointment.version();
        expected.check(loaded)?;

        let from = appointment.status();
        appointment.set_status(status, self.clock.now())?;

        let stored = self
            .appointments()
            .save(&appointment, ExpectedVersion::Exact(loaded))
            .await?;
        if !stored.is_active() {
            self.release(stored.resource_id(), id, stored.interval()).await;
        }
        info!(appointment_id = %id, from = %from, to = %status, "appointment status changed");
        Ok(stored)
    }

    pub async fn cancel(
        &self,
        id: AppointmentId,
        expected: ExpectedVersion,
    ) -> Result<Appointment, ServiceError> {
        self.set_status(id, expected, AppointmentStatus::Cancelled).await
    }

    pub async fn get_appointment(&self, id: AppointmentId) -> Result<Appointment, ServiceError> {
        self.appointments()
            .find(&id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                kind: "appointment",
                id: id.to_string(),
            })
    }

    /// Appointments starting on `date`, by start time.
    pub async fn for_date(&self, date: NaiveDate) -> Result<Vec<Appointment>, ServiceError> {
        let all = self.appointments().all().await?;
        Ok(for_date(date, &all)?.into_iter().cloned().collect())
    }

    /// One resource's appointments starting on `date`.
    pub async fn resource_day(
        &self,
        resource_id: &ResourceId,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, ServiceError> {
        let own = self.resource_appointments(resource_id).await?;
        Ok(for_resource_on(resource_id, date, &own)?
            .into_iter()
            .cloned()
            .collect())
    }

    /// Calendar days in `[start, end]` with at least one appointment.
    pub async fn days_with_appointments(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>, ServiceError> {
        let all = self.appointments().all().await?;
        Ok(days_with_appointments(start, end, &all)?)
    }

    async fn resource_appointments(
        &self,
        resource_id: &ResourceId,
    ) -> Result<Vec<Appointment>, ServiceError> {
        let key = resource_id.as_str();
        let predicate = move |record: &serde_json::Value| {
            record.get("resourceId").and_then(serde_json::Value::as_str) == Some(key)
        };
        Ok(self.appointments().query(&predicate).await?)
    }

    /// Read the resource's schedule, creating it on first use from the
    /// resource's active appointment records.
    async fn schedule(&self, resource_id: &ResourceId) -> Result<ResourceSchedule, ServiceError> {
        let key = resource_id.to_string();
        if let Some(schedule) = self.schedules().find(&key).await? {
            return Ok(schedule);
        }

        let reservations = self
            .resource_appointments(resource_id)
            .await?
            .into_iter()
            .filter(Appointment::is_active)
            .map(|a| Reservation {
                appointment_id: a.id_typed(),
                resource_id: resource_id.clone(),
                interval: a.interval(),
            })
            .collect();
        let fresh = ResourceSchedule {
            id: key.clone(),
            resource_id: resource_id.clone(),
            reservations,
            updated_at: self.clock.now(),
            version: 0,
        };
        match self.schedules().insert(&fresh).await {
            Ok(schedule) => Ok(schedule),
            Err(StoreError::Duplicate { .. }) => {
                self.schedules().find(&key).await?.ok_or_else(|| {
                    ServiceError::Conflict(format!(
                        "schedule of resource {resource_id} changed concurrently"
                    ))
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check `candidate` against `schedule` and add a reservation for
    /// `occupant`, all in one exact-version write.
    ///
    /// The occupant's own reservations are ignored by the check, so a move
    /// may overlap the slot it leaves.
    async fn reserve(
        &self,
        mut schedule: ResourceSchedule,
        candidate: &Candidate,
        occupant: AppointmentId,
    ) -> Result<(), ServiceError> {
        ensure_available(candidate, &schedule.reservations, Some(occupant))?;

        let expected = ExpectedVersion::Exact(schedule.version);
        schedule.reservations.push(Reservation {
            appointment_id: occupant,
            resource_id: candidate.resource_id.clone(),
            interval: candidate.interval,
        });
        schedule.updated_at = self.clock.now();
        match self.schedules().save(&schedule, expected).await {
            Ok(_) => Ok(()),
            Err(StoreError::Concurrency(_)) => Err(ServiceError::Conflict(format!(
                "resource {} was booked concurrently; reload and retry",
                candidate.resource_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Drop `occupant`'s reservation of `interval`.
    ///
    /// Dropping only ever frees time, so a concurrent write is simply retried.
    /// If it still fails the reservation stays and the slot stays blocked.
    async fn release(
        &self,
        resource_id: &ResourceId,
        occupant: AppointmentId,
        interval: TimeInterval,
    ) {
        for _ in 0..RELEASE_ATTEMPTS {
            let mut schedule = match self.schedules().find(&resource_id.to_string()).await {
                Ok(Some(schedule)) => schedule,
                Ok(None) => return,
                Err(e) => {
                    warn!(
                        %resource_id,
                        appointment_id = %occupant,
                        error = %e,
                        "reservation not released"
                    );
                    return;
                }
            };
            let before = schedule.reservations.len();
            schedule
                .reservations
                .retain(|r| !(r.appointment_id == occupant && r.interval == interval));
            if schedule.reservations.len() == before {
                return;
            }

            let expected = ExpectedVersion::Exact(schedule.version);
            schedule.updated_at = self.clock.now();
            match self.schedules().save(&schedule, expected).await {
                Ok(_) => return,
                Err(StoreError::Concurrency(_)) => continue,
                Err(e) => {
                    warn!(
                        %resource_id,
                        appointment_id = %occupant,
                        error = %e,
                        "reservation not released"
                    );
                    return;
                }
            }
        }
        warn!(%resource_id, appointment_id = %occupant, "reservation not released after retries");
    }
}
