use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub type BookingId = i64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub name: String,
    pub number: String,
    pub email: String,
}

/// Everything the allocator needs to claim one (restaurant, date, slot) key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub restaurant_id: i64,
    pub date: NaiveDate,
    pub slot: String,
    pub contact: Contact,
    pub party_size: u32,
}

/// An active booking. Rows exist only between reservation and cancellation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub booking_id: BookingId,
    pub restaurant_id: i64,
    pub date: NaiveDate,
    pub slot: String,
    pub contact_name: String,
    pub contact_number: String,
    pub contact_email: String,
    pub party_size: i64,
    pub created_at: NaiveDateTime,
}

/// A booking as listed back to its owner, joined with the restaurant name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingSummary {
    pub booking_id: BookingId,
    pub restaurant_id: i64,
    pub restaurant_name: String,
    pub date: NaiveDate,
    pub slot: String,
}
