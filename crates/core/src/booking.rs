//! Availability and conflict engine for appointment scheduling.
//!
//! All functions here are pure interval arithmetic over minutes-from-midnight;
//! the race-safe create (conflict recheck inside a single statement) lives in
//! the appointment repository.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    pub open_minute: u16,
    pub close_minute: u16,
    pub slot_step_minutes: u16,
}

impl Default for BusinessHours {
    fn default() -> Self {
        // 09:00-18:00, 30-minute grid
        Self { open_minute: 540, close_minute: 1080, slot_step_minutes: 30 }
    }
}

impl BusinessHours {
    pub fn fits(&self, start_minute: u16, duration_minutes: u16) -> bool {
        start_minute >= self.open_minute
            && u32::from(start_minute) + u32::from(duration_minutes) <= u32::from(self.close_minute)
    }
}

/// A non-cancelled appointment interval, as loaded from the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedSlot {
    pub date: NaiveDate,
    pub start_minute: u16,
    pub duration_minutes: u16,
}

impl BookedSlot {
    pub fn end_minute(&self) -> u16 {
        self.start_minute.saturating_add(self.duration_minutes)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRequest {
    pub date: NaiveDate,
    pub start_minute: u16,
    pub duration_minutes: u16,
}

impl SlotRequest {
    pub fn end_minute(&self) -> u16 {
        self.start_minute.saturating_add(self.duration_minutes)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedSlot {
    pub date: NaiveDate,
    pub start_minute: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
    pub conflicts: Vec<BookedSlot>,
    pub suggestions: Vec<SuggestedSlot>,
}

/// Half-open interval overlap: [a_start, a_end) intersects [b_start, b_end).
pub fn intervals_overlap(a_start: u16, a_end: u16, b_start: u16, b_end: u16) -> bool {
    a_start < b_end && b_start < a_end
}

/// Booked slots on the requested date that overlap the requested interval.
pub fn conflicts_for(request: &SlotRequest, booked: &[BookedSlot]) -> Vec<BookedSlot> {
    booked
        .iter()
        .filter(|slot| {
            slot.date == request.date
                && intervals_overlap(
                    request.start_minute,
                    request.end_minute(),
                    slot.start_minute,
                    slot.end_minute(),
                )
        })
        .copied()
        .collect()
}

/// Start minutes on `date` where an appointment of `duration_minutes` fits
/// inside business hours without overlapping any booked slot. Earliest first.
pub fn free_starts_on(
    date: NaiveDate,
    duration_minutes: u16,
    booked: &[BookedSlot],
    hours: &BusinessHours,
) -> Vec<u16> {
    let step = hours.slot_step_minutes.max(1);
    let mut starts = Vec::new();

    let mut start = hours.open_minute;
    while hours.fits(start, duration_minutes) {
        let end = start.saturating_add(duration_minutes);
        let free = booked.iter().all(|slot| {
            slot.date != date
                || !intervals_overlap(start, end, slot.start_minute, slot.end_minute())
        });
        if free {
            starts.push(start);
        }
        start = start.saturating_add(step);
    }

    starts
}

/// Greedy forward scan: fixed increments inside business hours on the
/// requested date, then subsequent dates up to `horizon_days`, returning the
/// first `max_suggestions` free slots. Ties broken by earliest time.
pub fn suggest_slots(
    request: &SlotRequest,
    booked: &[BookedSlot],
    hours: &BusinessHours,
    horizon_days: u16,
    max_suggestions: usize,
) -> Vec<SuggestedSlot> {
    let mut suggestions = Vec::new();

    for offset in 0..=horizon_days {
        let Some(date) = request.date.checked_add_days(Days::new(u64::from(offset))) else {
            break;
        };
        for start_minute in free_starts_on(date, request.duration_minutes, booked, hours) {
            suggestions.push(SuggestedSlot { date, start_minute });
            if suggestions.len() >= max_suggestions {
                return suggestions;
            }
        }
    }

    suggestions
}

/// The `check_availability` contract: a free slot reports available with no
/// suggestions; a conflicting slot reports the overlaps and the first free
/// alternatives.
pub fn check_availability(
    request: &SlotRequest,
    booked: &[BookedSlot],
    hours: &BusinessHours,
    horizon_days: u16,
    max_suggestions: usize,
) -> Availability {
    let conflicts = conflicts_for(request, booked);
    if conflicts.is_empty() {
        return Availability { available: true, conflicts, suggestions: Vec::new() };
    }

    let suggestions = suggest_slots(request, booked, hours, horizon_days, max_suggestions);
    Availability { available: false, conflicts, suggestions }
}
