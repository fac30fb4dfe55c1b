//! Day-level views over a set of appointments.
//!
//! Calendar days are taken in each appointment's own recorded offset.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use workshop_core::{DomainError, DomainResult, ResourceId, TimeInterval};

use crate::appointment::Appointment;

/// Appointments starting on `date`, ordered by start time.
///
/// An appointment belongs to `date` when its start lies in
/// `[date 00:00, date+1 00:00)` at the appointment's offset.
pub fn for_date<'a>(
    date: NaiveDate,
    appointments: &'a [Appointment],
) -> DomainResult<Vec<&'a Appointment>> {
    let mut hits = Vec::new();
    for appointment in appointments {
        let start = appointment.start();
        let day = TimeInterval::day(date, *start.offset())?;
        if day.contains(start) {
            hits.push(appointment);
        }
    }
    hits.sort_by_key(|a| a.start());
    Ok(hits)
}

/// [`for_date`] restricted to one resource.
pub fn for_resource_on<'a>(
    resource_id: &ResourceId,
    date: NaiveDate,
    appointments: &'a [Appointment],
) -> DomainResult<Vec<&'a Appointment>> {
    let mut hits = for_date(date, appointments)?;
    hits.retain(|a| a.resource_id() == resource_id);
    Ok(hits)
}

/// Distinct calendar days in `[range_start, range_end]` (inclusive) on which
/// at least one appointment starts, ascending.
pub fn days_with_appointments(
    range_start: NaiveDate,
    range_end: NaiveDate,
    appointments: &[Appointment],
) -> DomainResult<BTreeSet<NaiveDate>> {
    if range_end < range_start {
        return Err(DomainError::validation(format!(
            "range end {range_end} is before range start {range_start}"
        )));
    }
    Ok(appointments
        .iter()
        .map(|a| a.start().date_naive())
        .filter(|day| (range_start..=range_end).contains(day))
        .collect())
}
