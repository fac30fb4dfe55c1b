use core::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use workshop_core::{
    AggregateRoot, AppointmentId, DomainError, DomainResult, ResourceId, TimeInterval,
};

/// Appointment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in-progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// Cancelled appointments hold no time on their resource.
    pub fn occupies_resource(self) -> bool {
        self != AppointmentStatus::Cancelled
    }
}

impl core::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown appointment status '{s}'")))
    }
}

/// Input for a new booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub id: AppointmentId,
    pub resource_id: ResourceId,
    pub interval: TimeInterval,
    pub client: Option<String>,
    pub vehicle: Option<String>,
    pub service: Option<String>,
    pub notes: Option<String>,
}

/// A booked slot on a resource.
///
/// The interval is validated on construction and on deserialization, so an
/// `Appointment` never has `end_time <= start_time`. Client, vehicle and
/// service are carried for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AppointmentRecord", into = "AppointmentRecord")]
pub struct Appointment {
    id: AppointmentId,
    resource_id: ResourceId,
    interval: TimeInterval,
    status: AppointmentStatus,
    client: Option<String>,
    vehicle: Option<String>,
    service: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

/// Persisted layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AppointmentRecord {
    id: AppointmentId,
    #[serde(rename = "resourceId")]
    resource_id: ResourceId,
    start_time: DateTime<FixedOffset>,
    end_time: DateTime<FixedOffset>,
    status: AppointmentStatus,
    #[serde(default)]
    client: Option<String>,
    #[serde(default)]
    vehicle: Option<String>,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    version: u64,
}

impl TryFrom<AppointmentRecord> for Appointment {
    type Error = DomainError;

    fn try_from(r: AppointmentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            resource_id: r.resource_id,
            interval: TimeInterval::new(r.start_time, r.end_time)?,
            status: r.status,
            client: r.client,
            vehicle: r.vehicle,
            service: r.service,
            notes: r.notes,
            created_at: r.created_at,
            updated_at: r.updated_at,
            version: r.version,
        })
    }
}

impl From<Appointment> for AppointmentRecord {
    fn from(a: Appointment) -> Self {
        Self {
            id: a.id,
            resource_id: a.resource_id,
            start_time: a.interval.start(),
            end_time: a.interval.end(),
            status: a.status,
            client: a.client,
            vehicle: a.vehicle,
            service: a.service,
            notes: a.notes,
            created_at: a.created_at,
            updated_at: a.updated_at,
            version: a.version,
        }
    }
}

impl Appointment {
    /// A new booking in status `scheduled`. Version stays 0 until stored.
    pub fn schedule(input: NewAppointment, now: DateTime<Utc>) -> Self {
        Self {
            id: input.id,
            resource_id: input.resource_id,
            interval: input.interval,
            status: AppointmentStatus::Scheduled,
            client: input.client,
            vehicle: input.vehicle,
            service: input.service,
            notes: input.notes,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> AppointmentId {
        self.id
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    pub fn interval(&self) -> TimeInterval {
        self.interval
    }

    pub fn start(&self) -> DateTime<FixedOffset> {
        self.interval.start()
    }

    pub fn end(&self) -> DateTime<FixedOffset> {
        self.interval.end()
    }

    pub fn status(&self) -> AppointmentStatus {
        self.status
    }

    pub fn client(&self) -> Option<&str> {
        self.client.as_deref()
    }

    pub fn vehicle(&self) -> Option<&str> {
        self.vehicle.as_deref()
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_active(&self) -> bool {
        self.status.occupies_resource()
    }

    /// Move the appointment to a new interval on the same resource.
    pub fn reschedule(&mut self, interval: TimeInterval, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_active() {
            return Err(DomainError::validation(format!(
                "appointment {} is cancelled and cannot be rescheduled",
                self.id
            )));
        }
        self.interval = interval;
        self.updated_at = now;
        Ok(())
    }

    /// Advance the status.
    ///
    /// Cancellation is permanent and a status cannot be set to itself; any
    /// other move is the caller's call.
    pub fn set_status(
        &mut self,
        status: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if status == self.status || self.status == AppointmentStatus::Cancelled {
            return Err(DomainError::invalid_transition(self.status, status));
        }
        self.status = status;
        self.updated_at = now;
        Ok(())
    }
}

impl AggregateRoot for Appointment {
    type Id = AppointmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
