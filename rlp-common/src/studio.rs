//! Studio rooms, pricing and availability
//!
//! Bookings are whole hours inside the 09:00–21:00 operating window.
//! Times are studio wall-clock hours; dates are calendar dates.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::validation::{is_valid_email, ValidationErrors};
use crate::{Error, Result};

/// First bookable hour
pub const OPEN_HOUR: u32 = 9;
/// Hour the studio closes; last slot is 20:00–21:00
pub const CLOSE_HOUR: u32 = 21;
pub const HALF_DAY_HOURS: u32 = 4;
pub const FULL_DAY_HOURS: u32 = 8;
/// Highest accepted rate of any kind (100 000 currency units)
pub const RATE_MAX_CENTS: i64 = 10_000_000;

/// Bookable rooms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudioRoom {
    MainRoom,
    BoothA,
    BoothB,
    MixSuite,
}

impl StudioRoom {
    pub const ALL: [StudioRoom; 4] = [
        StudioRoom::MainRoom,
        StudioRoom::BoothA,
        StudioRoom::BoothB,
        StudioRoom::MixSuite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StudioRoom::MainRoom => "main_room",
            StudioRoom::BoothA => "booth_a",
            StudioRoom::BoothB => "booth_b",
            StudioRoom::MixSuite => "mix_suite",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StudioRoom::MainRoom => "Main Room",
            StudioRoom::BoothA => "Vocal Booth A",
            StudioRoom::BoothB => "Vocal Booth B",
            StudioRoom::MixSuite => "Mix Suite",
        }
    }
}

impl fmt::Display for StudioRoom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudioRoom {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "main_room" => Ok(StudioRoom::MainRoom),
            "booth_a" => Ok(StudioRoom::BoothA),
            "booth_b" => Ok(StudioRoom::BoothB),
            "mix_suite" => Ok(StudioRoom::MixSuite),
            other => Err(format!("Unknown studio room: {}", other)),
        }
    }
}

/// Rates for one room (`room_pricing` row)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPricing {
    pub room: StudioRoom,
    pub hourly_rate_cents: i64,
    pub half_day_rate_cents: i64,
    pub full_day_rate_cents: i64,
    pub active: bool,
}

impl RoomPricing {
    /// Seed rates used when the pricing table is first created
    pub fn default_for(room: StudioRoom) -> Self {
        let (hourly, half_day, full_day) = match room {
            StudioRoom::MainRoom => (7_500, 27_500, 50_000),
            StudioRoom::BoothA | StudioRoom::BoothB => (4_000, 14_500, 26_000),
            StudioRoom::MixSuite => (6_000, 22_000, 40_000),
        };
        Self {
            room,
            hourly_rate_cents: hourly,
            half_day_rate_cents: half_day,
            full_day_rate_cents: full_day,
            active: true,
        }
    }
}

/// Price of a block of `hours`
///
/// Block rates apply from 4 hours (half day) and 8 hours (full day);
/// hours beyond a block are charged hourly.
pub fn quote(pricing: &RoomPricing, hours: u32) -> i64 {
    let hours = hours as i64;
    let full = FULL_DAY_HOURS as i64;
    let half = HALF_DAY_HOURS as i64;
    let hourly = |h: i64| h.saturating_mul(pricing.hourly_rate_cents);
    if hours >= full {
        pricing.full_day_rate_cents.saturating_add(hourly(hours - full))
    } else if hours >= half {
        pricing.half_day_rate_cents.saturating_add(hourly(hours - half))
    } else {
        hourly(hours)
    }
}

/// Booking status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Confirmed => "confirmed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Completed => "completed",
        }
    }

    /// Whether this booking still occupies its slot
    pub fn holds_slot(&self) -> bool {
        !matches!(self, SessionStatus::Cancelled)
    }

    /// pending → confirmed → completed; cancel from pending or confirmed
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Confirmed, Completed) | (Pending, Cancelled) | (Confirmed, Cancelled)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "confirmed" => Ok(SessionStatus::Confirmed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(format!("Unknown session status: {}", other)),
        }
    }
}

/// A booking (`studio_sessions` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudioSession {
    pub id: Uuid,
    pub room: StudioRoom,
    pub session_date: NaiveDate,
    pub start_hour: u32,
    pub duration_hours: u32,
    pub booker_name: String,
    pub booker_email: String,
    pub artist_name: Option<String>,
    pub notes: Option<String>,
    pub total_cents: i64,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudioSession {
    pub fn end_hour(&self) -> u32 {
        self.start_hour.saturating_add(self.duration_hours)
    }

    /// Occupies any part of [start, end) on `date` in `room`
    pub fn overlaps(&self, room: StudioRoom, date: NaiveDate, start: u32, end: u32) -> bool {
        self.status.holds_slot()
            && self.room == room
            && self.session_date == date
            && self.start_hour < end
            && start < self.end_hour()
    }
}

/// One hour of the operating window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start_hour: u32,
    pub end_hour: u32,
    pub available: bool,
}

impl TimeSlot {
    pub fn label(&self) -> String {
        format!("{:02}:00-{:02}:00", self.start_hour, self.end_hour)
    }
}

/// Hourly slots 09:00–21:00 with each slot checked against `bookings`
pub fn available_slots(room: StudioRoom, date: NaiveDate, bookings: &[StudioSession]) -> Vec<TimeSlot> {
    (OPEN_HOUR..CLOSE_HOUR)
        .map(|hour| TimeSlot {
            start_hour: hour,
            end_hour: hour + 1,
            available: !bookings.iter().any(|b| b.overlaps(room, date, hour, hour + 1)),
        })
        .collect()
}

/// Booking request payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBooking {
    pub room: StudioRoom,
    pub session_date: NaiveDate,
    pub start_hour: u32,
    pub duration_hours: u32,
    pub booker_name: String,
    pub booker_email: String,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewBooking {
    /// Field checks, window bounds, and no booking in the past
    pub fn validate(&mut self, now: DateTime<Utc>) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let start_ok = (OPEN_HOUR..CLOSE_HOUR).contains(&self.start_hour);
        if !start_ok {
            errors.add(
                "start_hour",
                format!("must be between {} and {}", OPEN_HOUR, CLOSE_HOUR - 1),
            );
        }
        if self.duration_hours == 0 || self.duration_hours > CLOSE_HOUR - OPEN_HOUR {
            errors.add(
                "duration_hours",
                format!("must be between 1 and {}", CLOSE_HOUR - OPEN_HOUR),
            );
        } else if start_ok && self.start_hour + self.duration_hours > CLOSE_HOUR {
            errors.add("duration_hours", "session must end by closing time");
        }

        let today = now.date_naive();
        if self.session_date < today
            || (self.session_date == today && self.start_hour <= now.hour())
        {
            errors.add("session_date", "must be in the future");
        }

        errors.check_length("booker_name", &self.booker_name, 2, 100);
        if !is_valid_email(&self.booker_email) {
            errors.add("booker_email", "is not a valid email address");
        }
        if let Some(notes) = &self.notes {
            errors.check_length("notes", notes, 0, 2_000);
        }

        self.booker_name = self.booker_name.trim().to_string();
        self.booker_email = self.booker_email.trim().to_string();
        self.artist_name = self
            .artist_name
            .take()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        errors.into_result()
    }

    pub fn end_hour(&self) -> u32 {
        self.start_hour.saturating_add(self.duration_hours)
    }
}

/// Fail if `request` collides with any live booking
pub fn check_conflict(request: &NewBooking, existing: &[StudioSession]) -> Result<()> {
    let clash = existing.iter().find(|b| {
        b.overlaps(
            request.room,
            request.session_date,
            request.start_hour,
            request.end_hour(),
        )
    });
    match clash {
        Some(b) => Err(Error::Conflict(format!(
            "{} is already booked {:02}:00-{:02}:00 on {}",
            request.room.display_name(),
            b.start_hour,
            b.end_hour(),
            b.session_date
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 5, 17).unwrap()
    }

    fn booking(room: StudioRoom, start: u32, hours: u32, status: SessionStatus) -> StudioSession {
        StudioSession {
            id: Uuid::new_v4(),
            room,
            session_date: date(),
            start_hour: start,
            duration_hours: hours,
            booker_name: "Mara".to_string(),
            booker_email: "mara@label.fm".to_string(),
            artist_name: None,
            notes: None,
            total_cents: 0,
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn request(start: u32, hours: u32) -> NewBooking {
        NewBooking {
            room: StudioRoom::MainRoom,
            session_date: date(),
            start_hour: start,
            duration_hours: hours,
            booker_name: "Mara Quinn".to_string(),
            booker_email: "mara@label.fm".to_string(),
            artist_name: Some("  ".to_string()),
            notes: None,
        }
    }

    #[test]
    fn test_empty_day_has_twelve_open_slots() {
        let slots = available_slots(StudioRoom::MainRoom, date(), &[]);
        assert_eq!(slots.len(), 12);
        assert_eq!(slots.first().unwrap().start_hour, 9);
        assert_eq!(slots.last().unwrap().end_hour, 21);
        assert!(slots.iter().all(|s| s.available));
        assert_eq!(slots[0].label(), "09:00-10:00");
    }

    #[test]
    fn test_booked_hours_unavailable() {
        let bookings = vec![booking(StudioRoom::MainRoom, 13, 3, SessionStatus::Confirmed)];
        let slots = available_slots(StudioRoom::MainRoom, date(), &bookings);
        let taken: Vec<u32> = slots.iter().filter(|s| !s.available).map(|s| s.start_hour).collect();
        assert_eq!(taken, vec![13, 14, 15]);
    }

    #[test]
    fn test_cancelled_and_other_rooms_ignored() {
        let bookings = vec![
            booking(StudioRoom::MainRoom, 10, 2, SessionStatus::Cancelled),
            booking(StudioRoom::BoothA, 10, 2, SessionStatus::Pending),
        ];
        let slots = available_slots(StudioRoom::MainRoom, date(), &bookings);
        assert!(slots.iter().all(|s| s.available));
    }

    #[test]
    fn test_quote_tiers() {
        let pricing = RoomPricing::default_for(StudioRoom::MainRoom);
        assert_eq!(quote(&pricing, 1), 7_500);
        assert_eq!(quote(&pricing, 3), 22_500);
        assert_eq!(quote(&pricing, 4), 27_500);
        assert_eq!(quote(&pricing, 5), 35_000);
        assert_eq!(quote(&pricing, 8), 50_000);
        assert_eq!(quote(&pricing, 10), 65_000);

        let extreme = RoomPricing {
            hourly_rate_cents: i64::MAX,
            ..pricing
        };
        assert_eq!(quote(&extreme, 12), i64::MAX);
    }

    #[test]
    fn test_conflict_detection() {
        let existing = vec![booking(StudioRoom::MainRoom, 12, 2, SessionStatus::Pending)];
        assert!(check_conflict(&request(10, 2), &existing).is_ok());
        assert!(check_conflict(&request(14, 2), &existing).is_ok());
        assert!(matches!(
            check_conflict(&request(11, 2), &existing),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            check_conflict(&request(13, 1), &existing),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_validate_window_bounds() {
        let now = Utc::now();
        let mut r = request(8, 2);
        assert!(r.validate(now).unwrap_err().has("start_hour"));

        let mut r = request(19, 3);
        assert!(r.validate(now).unwrap_err().has("duration_hours"));

        let mut r = request(10, 0);
        assert!(r.validate(now).unwrap_err().has("duration_hours"));

        let mut r = request(9, 12);
        r.validate(now).unwrap();
        assert!(r.artist_name.is_none());

        // Out-of-range start is reported without the end-of-day check
        let mut r = request(u32::MAX, 1);
        let errors = r.validate(now).unwrap_err();
        assert!(errors.has("start_hour"));
        assert!(!errors.has("duration_hours"));
    }

    #[test]
    fn test_validate_rejects_past() {
        let mut r = request(10, 1);
        r.session_date = (Utc::now() - Duration::days(1)).date_naive();
        assert!(r.validate(Utc::now()).unwrap_err().has("session_date"));
    }

    #[test]
    fn test_session_transitions() {
        use SessionStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
    }

    #[test]
    fn test_room_parse() {
        for room in StudioRoom::ALL {
            assert_eq!(room.as_str().parse::<StudioRoom>().unwrap(), room);
        }
        assert!("attic".parse::<StudioRoom>().is_err());
    }
}
