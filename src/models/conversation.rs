use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Availability, BookingId, BookingSummary, Intent};

/// A value the dialogue collects from the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Cuisine,
    City,
    RestaurantName,
    Date,
    Time,
    NumberOfPeople,
    ContactName,
    ContactEmail,
    ContactNumber,
}

impl Field {
    /// Booking fields in the order they are asked for.
    pub const BOOKING: [Field; 9] = [
        Field::Cuisine,
        Field::City,
        Field::RestaurantName,
        Field::Date,
        Field::Time,
        Field::NumberOfPeople,
        Field::ContactName,
        Field::ContactEmail,
        Field::ContactNumber,
    ];

    /// Contact fields used to look up bookings for cancellation.
    pub const CANCEL: [Field; 3] = [Field::ContactName, Field::ContactEmail, Field::ContactNumber];

    pub fn key(&self) -> &'static str {
        match self {
            Field::Cuisine => "cuisine",
            Field::City => "city",
            Field::RestaurantName => "restaurant_name",
            Field::Date => "date",
            Field::Time => "time",
            Field::NumberOfPeople => "number_of_people",
            Field::ContactName => "contact_name",
            Field::ContactEmail => "contact_email",
            Field::ContactNumber => "contact_number",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Field::BOOKING.into_iter().find(|f| f.key() == key)
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            Field::Cuisine => "Please enter your cuisine preference.",
            Field::City => "Please enter the city.",
            Field::RestaurantName => "Please specify the restaurant name or ID.",
            Field::Date => "Please enter the reservation date (YYYY-MM-DD).",
            Field::Time => "Please enter the time (e.g., 19:00 or 7 PM).",
            Field::NumberOfPeople => "Number of people?",
            Field::ContactName => "Your full name?",
            Field::ContactEmail => "Your email?",
            Field::ContactNumber => "Your contact number?",
        }
    }
}

/// Where a conversation is in the booking or cancel flow.
///
/// Slot presentation happens inside the turn that completes the last booking
/// field, so there is no resting stage for it: the conversation lands in
/// `AwaitSelection` or ends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DialogueStage {
    Start,
    Collecting,
    AwaitSelection,
    CancelCollecting,
    CancelList,
    Confirmed,
    CancelConfirmed,
    Ended,
    Failed,
}

impl DialogueStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogueStage::Start => "start",
            DialogueStage::Collecting => "collecting",
            DialogueStage::AwaitSelection => "await_selection",
            DialogueStage::CancelCollecting => "cancel_collecting",
            DialogueStage::CancelList => "cancel_list",
            DialogueStage::Confirmed => "confirmed",
            DialogueStage::CancelConfirmed => "cancel_confirmed",
            DialogueStage::Ended => "ended",
            DialogueStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DialogueStage::Confirmed
                | DialogueStage::CancelConfirmed
                | DialogueStage::Ended
                | DialogueStage::Failed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub session_id: String,
    pub stage: DialogueStage,
    pub intent: Option<Intent>,
    /// "Today" as seen by the user; relative dates are resolved against it.
    pub reference_date: NaiveDate,
    pub fields: BTreeMap<Field, String>,
    #[serde(default)]
    pub features: Vec<String>,
    pub asking: Option<Field>,
    pub restaurant_id: Option<i64>,
    pub offered: Option<Availability>,
    #[serde(default)]
    pub fetched_bookings: Vec<BookingSummary>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub recommendations_shown: bool,
    pub last_activity: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl Conversation {
    pub fn new(session_id: impl Into<String>, reference_date: NaiveDate, ttl_minutes: i64) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            session_id: session_id.into(),
            stage: DialogueStage::Start,
            intent: None,
            reference_date,
            fields: BTreeMap::new(),
            features: vec![],
            asking: None,
            restaurant_id: None,
            offered: None,
            fetched_bookings: vec![],
            retries: 0,
            recommendations_shown: false,
            last_activity: now,
            expires_at: now + Duration::minutes(ttl_minutes),
        }
    }

    /// Clears everything collected so far, keeping the session identity.
    pub fn restart(&mut self) {
        self.stage = DialogueStage::Start;
        self.intent = None;
        self.fields.clear();
        self.features.clear();
        self.asking = None;
        self.restaurant_id = None;
        self.offered = None;
        self.fetched_bookings.clear();
        self.retries = 0;
        self.recommendations_shown = false;
    }

    pub fn touch(&mut self, ttl_minutes: i64) {
        let now = Utc::now().naive_utc();
        self.last_activity = now;
        self.expires_at = now + Duration::minutes(ttl_minutes);
    }

    pub fn value(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// First field of `required` that has no accepted value yet.
    pub fn next_missing(&self, required: &[Field]) -> Option<Field> {
        required.iter().copied().find(|f| !self.fields.contains_key(f))
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.value(Field::Date)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    }

    pub fn party_size(&self) -> Option<u32> {
        self.value(Field::NumberOfPeople).and_then(|n| n.parse().ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnOutcome {
    Greeting,
    Fallback,
    AskField { field: Field },
    InvalidField { field: Field },
    SlotOptions { slots: Vec<String> },
    SlotTaken { slots: Vec<String> },
    InvalidSelection,
    Confirmed { booking_id: BookingId },
    NoSlots,
    BookingList { bookings: Vec<BookingSummary> },
    Cancelled { booking_id: BookingId },
    BookingNotFound { booking_id: BookingId },
    NoBookings,
    RetriesExhausted,
    Failed { reason: String },
}

/// What the controller says back after a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reply {
    pub message: String,
    pub outcome: TurnOutcome,
}

impl Reply {
    pub fn new(message: impl Into<String>, outcome: TurnOutcome) -> Self {
        Self {
            message: message.into(),
            outcome,
        }
    }
}
