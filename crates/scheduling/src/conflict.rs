//! Scheduling collision checks for a single resource.
//!
//! Linear scan over the resource's appointments; the appointment volume per
//! resource is small enough that no index is kept.

use chrono::{DateTime, FixedOffset};

use workshop_core::{AppointmentId, DomainError, DomainResult, ResourceId, TimeInterval};

use crate::appointment::Appointment;

/// A proposed booking: a resource and a validated, positive-length interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub resource_id: ResourceId,
    pub interval: TimeInterval,
}

impl Candidate {
    /// Rejects zero and negative durations, which would otherwise never
    /// collide and could be stacked without limit.
    pub fn new(
        resource_id: ResourceId,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> DomainResult<Self> {
        Ok(Self {
            resource_id,
            interval: TimeInterval::new(start, end)?,
        })
    }
}

/// Anything that holds time on a resource: an appointment record, or a
/// reservation kept alongside the resource's schedule.
pub trait Occupancy {
    /// The appointment holding the time.
    fn occupant(&self) -> AppointmentId;

    fn resource(&self) -> &ResourceId;

    fn span(&self) -> TimeInterval;

    /// Cancelled bookings hold nothing.
    fn holds_resource(&self) -> bool;
}

impl Occupancy for Appointment {
    fn occupant(&self) -> AppointmentId {
        self.id_typed()
    }

    fn resource(&self) -> &ResourceId {
        self.resource_id()
    }

    fn span(&self) -> TimeInterval {
        self.interval()
    }

    fn holds_resource(&self) -> bool {
        self.is_active()
    }
}

/// Existing bookings that collide with `candidate`.
///
/// Only bookings on the same resource, not cancelled, and not held by
/// `exclude` (the appointment being edited) are considered.
pub fn conflicts<'a, O: Occupancy>(
    candidate: &'a Candidate,
    existing: &'a [O],
    exclude: Option<AppointmentId>,
) -> impl Iterator<Item = &'a O> + 'a {
    existing.iter().filter(move |o| {
        o.resource() == &candidate.resource_id
            && o.holds_resource()
            && Some(o.occupant()) != exclude
            && o.span().overlaps(&candidate.interval)
    })
}

pub fn has_conflict<O: Occupancy>(
    candidate: &Candidate,
    existing: &[O],
    exclude: Option<AppointmentId>,
) -> bool {
    conflicts(candidate, existing, exclude).next().is_some()
}

/// Fails with [`DomainError::Conflict`] naming the first colliding booking.
pub fn ensure_available<O: Occupancy>(
    candidate: &Candidate,
    existing: &[O],
    exclude: Option<AppointmentId>,
) -> DomainResult<()> {
    match conflicts(candidate, existing, exclude).next() {
        None => Ok(()),
        Some(clash) => Err(DomainError::conflict(format!(
            "resource {} is already booked from {} to {} (appointment {})",
            candidate.resource_id,
            clash.span().start().to_rfc3339(),
            clash.span().end().to_rfc3339(),
            clash.occupant()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appointment::{AppointmentStatus, NewAppointment};
    use chrono::{TimeDelta, Utc};
    use proptest::prelude::*;

    fn at(hm: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(&format!("2026-03-10T{hm}:00+00:00")).unwrap()
    }

    fn resource(id: &str) -> ResourceId {
        ResourceId::new(id).unwrap()
    }

    fn appointment(res: &str, from: &str, to: &str) -> Appointment {
        Appointment::schedule(
            NewAppointment {
                id: AppointmentId::new(),
                resource_id: resource(res),
                interval: TimeInterval::new(at(from), at(to)).unwrap(),
                client: None,
                vehicle: None,
                service: None,
                notes: None,
            },
            Utc::now(),
        )
    }

    fn candidate(res: &str, from: &str, to: &str) -> Candidate {
        Candidate::new(resource(res), at(from), at(to)).unwrap()
    }

    #[test]
    fn overlapping_booking_conflicts() {
        let existing = vec![appointment("M1", "10:00", "11:00")];
        assert!(has_conflict(&candidate("M1", "10:30", "11:30"), &existing, None));
    }

    #[test]
    fn back_to_back_booking_does_not_conflict() {
        let existing = vec![appointment("M1", "10:00", "11:00")];
        assert!(!has_conflict(&candidate("M1", "11:00", "12:00"), &existing, None));
        assert!(!has_conflict(&candidate("M1", "09:00", "10:00"), &existing, None));
    }

    #[test]
    fn cancelled_appointment_never_conflicts() {
        let mut cancelled = appointment("M1", "10:00", "11:00");
        cancelled
            .set_status(AppointmentStatus::Cancelled, Utc::now())
            .unwrap();
        let existing = vec![cancelled];
        assert!(!has_conflict(&candidate("M1", "10:00", "11:00"), &existing, None));
    }

    #[test]
    fn other_resources_are_ignored() {
        let existing = vec![appointment("M1", "09:30", "10:30")];
        assert!(has_conflict(&candidate("M1", "09:00", "10:00"), &existing, None));
        assert!(!has_conflict(&candidate("M2", "09:00", "10:00"), &existing, None));
    }

    #[test]
    fn edited_appointment_is_not_checked_against_itself() {
        let existing = vec![appointment("M1", "10:00", "11:00")];
        let own = existing[0].id_typed();
        let moved = candidate("M1", "10:15", "11:15");
        assert!(has_conflict(&moved, &existing, None));
        assert!(!has_conflict(&moved, &existing, Some(own)));
    }

    #[test]
    fn zero_duration_candidate_is_a_validation_error() {
        let err = Candidate::new(resource("M1"), at("10:00"), at("10:00")).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(Candidate::new(resource("M1"), at("10:00"), at("09:59")).is_err());
    }

    #[test]
    fn ensure_available_reports_the_clash() {
        let existing = vec![appointment("M1", "09:30", "10:30")];
        let err =
            ensure_available(&candidate("M1", "09:00", "10:00"), &existing, None).unwrap_err();
        match err {
            DomainError::Conflict(msg) => {
                assert!(msg.contains(&existing[0].id_typed().to_string()))
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn conflicts_lists_every_clash() {
        let existing = vec![
            appointment("M1", "08:00", "09:00"),
            appointment("M1", "09:30", "10:30"),
            appointment("M1", "10:45", "11:00"),
            appointment("M2", "09:00", "12:00"),
        ];
        let c = candidate("M1", "08:30", "10:50");
        assert_eq!(conflicts(&c, &existing, None).count(), 3);
    }

    proptest! {
        /// Property: the detector agrees with a direct pairwise overlap test.
        #[test]
        fn detector_matches_pairwise_overlap(
            slots in prop::collection::vec((0i64..600, 1i64..180, any::<bool>()), 0..20),
            c_start in 0i64..600,
            c_len in 1i64..180,
        ) {
            let base = at("00:00");
            let existing: Vec<Appointment> = slots
                .iter()
                .map(|&(s, l, cancelled)| {
                    let mut a = Appointment::schedule(
                        NewAppointment {
                            id: AppointmentId::new(),
                            resource_id: resource("M1"),
                            interval: TimeInterval::new(
                                base + TimeDelta::minutes(s),
                                base + TimeDelta::minutes(s + l),
                            ).unwrap(),
                            client: None,
                            vehicle: None,
                            service: None,
                            notes: None,
                        },
                        Utc::now(),
                    );
                    if cancelled {
                        a.set_status(AppointmentStatus::Cancelled, Utc::now()).unwrap();
                    }
                    a
                })
                .collect();

            let c = Candidate::new(
                resource("M1"),
                base + TimeDelta::minutes(c_start),
                base + TimeDelta::minutes(c_start + c_len),
            ).unwrap();

            let expected = slots.iter().any(|&(s, l, cancelled)| {
                !cancelled && s < c_start + c_len && c_start < s + l
            });
            prop_assert_eq!(has_conflict(&c, &existing, None), expected);
        }
    }
}
