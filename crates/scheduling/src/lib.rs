//! Appointment scheduling domain module.
//!
//! Appointment records, per-resource conflict detection and day-level
//! queries. Pure logic; the infrastructure layer supplies the appointment
//! snapshot each call works on.

pub mod appointment;
pub mod conflict;
pub mod query;

pub use appointment::{Appointment, AppointmentStatus, NewAppointment};
pub use conflict::{Candidate, Occupancy, conflicts, ensure_available, has_conflict};
pub use query::{days_with_appointments, for_date, for_resource_on};
