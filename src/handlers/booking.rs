use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{Booking, BookingId, BookingSummary, Contact, Field, ReservationRequest, Restaurant};
use crate::services::booking::Reservations;
use crate::services::validation::{validate_date, validate_email, validate_field, validate_party_size};
use crate::state::AppState;

fn validation(e: impl std::fmt::Display) -> AppError {
    AppError::Validation(e.to_string())
}

// POST /api/availability
#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub restaurant_id: i64,
    pub date: String,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub restaurant_id: i64,
    pub date: NaiveDate,
    pub available_slots: Vec<String>,
}

pub async fn availability(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AvailabilityRequest>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let date = validate_date(&payload.date).map_err(validation)?;
    let availability = state
        .bookings
        .available_slots(payload.restaurant_id, date)
        .await?;

    Ok(Json(AvailabilityResponse {
        restaurant_id: availability.restaurant_id,
        date: availability.date,
        available_slots: availability.slots,
    }))
}

// POST /api/book
#[derive(Deserialize)]
pub struct BookRequest {
    pub restaurant_id: i64,
    pub contact_name: String,
    pub contact_number: String,
    pub contact_email: String,
    pub date: String,
    pub slot: String,
    pub number_of_people: Option<u32>,
}

#[derive(Serialize)]
pub struct BookResponse {
    pub success: bool,
    pub message: String,
    pub booking_id: BookingId,
}

pub async fn book(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BookRequest>,
) -> Result<Json<BookResponse>, AppError> {
    let date = validate_date(&payload.date).map_err(validation)?;
    let party_size = match payload.number_of_people {
        Some(n) => validate_party_size(&n.to_string()).map_err(validation)?,
        None => 1,
    };
    let slot = payload.slot.trim();
    if slot.is_empty() {
        return Err(AppError::Validation("slot is required".to_string()));
    }

    let request = ReservationRequest {
        restaurant_id: payload.restaurant_id,
        date,
        slot: slot.to_string(),
        contact: Contact {
            name: validate_field(Field::ContactName, &payload.contact_name).map_err(validation)?,
            number: validate_field(Field::ContactNumber, &payload.contact_number)
                .map_err(validation)?,
            email: validate_email(payload.contact_email.trim())
                .map_err(validation)?
                .to_string(),
        },
        party_size,
    };

    let booking = state.bookings.reserve(request).await?;

    Ok(Json(BookResponse {
        success: true,
        message: format!(
            "Booking confirmed for {} at {}",
            booking.date, booking.slot
        ),
        booking_id: booking.booking_id,
    }))
}

// POST /api/cancel
#[derive(Deserialize)]
pub struct CancelRequest {
    pub booking_id: BookingId,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, AppError> {
    if !state.bookings.cancel(payload.booking_id).await? {
        return Err(AppError::NotFound(format!("booking {}", payload.booking_id)));
    }

    Ok(Json(CancelResponse {
        success: true,
        message: format!("Booking {} cancelled successfully", payload.booking_id),
    }))
}

// POST /api/bookings
#[derive(Deserialize)]
pub struct BookingsRequest {
    pub contact_number: String,
    pub contact_email: String,
}

#[derive(Serialize)]
pub struct BookingsResponse {
    pub bookings: Vec<BookingSummary>,
}

pub async fn bookings(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BookingsRequest>,
) -> Result<Json<BookingsResponse>, AppError> {
    let bookings = state
        .bookings
        .bookings_for_contact(payload.contact_number.trim(), payload.contact_email.trim())
        .await?;
    Ok(Json(BookingsResponse { bookings }))
}

// GET /api/bookings/:id
pub async fn booking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<BookingId>,
) -> Result<Json<Booking>, AppError> {
    state
        .bookings
        .booking(booking_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
}

// GET /api/restaurants/:id
pub async fn restaurant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Restaurant>, AppError> {
    state
        .bookings
        .restaurant(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("restaurant {id}")))
}
