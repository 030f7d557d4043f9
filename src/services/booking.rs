use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::TransactionBehavior;

use crate::db::{queries, Store};
use crate::errors::{is_unique_violation, StoreError};
use crate::models::{Availability, Booking, BookingId, BookingSummary, ReservationRequest, Restaurant};

/// Store operations the dialogue controller drives.
#[async_trait]
pub trait Reservations: Send + Sync {
    /// Resolves a numeric id or a restaurant name. `None` when nothing matches.
    async fn resolve_restaurant(
        &self,
        name_or_id: &str,
        city: Option<&str>,
    ) -> Result<Option<i64>, StoreError>;

    /// Best-effort snapshot of open slots. Unknown restaurants have none.
    async fn available_slots(
        &self,
        restaurant_id: i64,
        date: NaiveDate,
    ) -> Result<Availability, StoreError>;

    async fn reserve(&self, request: ReservationRequest) -> Result<Booking, StoreError>;

    /// Returns whether a booking was removed. Repeating the call returns false.
    async fn cancel(&self, booking_id: BookingId) -> Result<bool, StoreError>;

    async fn bookings_for_contact(
        &self,
        contact_number: &str,
        contact_email: &str,
    ) -> Result<Vec<BookingSummary>, StoreError>;
}

/// The only writer of bookings.
///
/// Double booking is prevented by the UNIQUE (restaurant_id, date, slot)
/// constraint: the insert either claims the key or fails, and the failure is
/// reported as [`StoreError::Conflict`]. No application lock is taken.
#[derive(Clone, Debug)]
pub struct BookingService {
    store: Store,
}

impl BookingService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn restaurant(&self, id: i64) -> Result<Option<Restaurant>, StoreError> {
        self.store
            .call("get_restaurant", move |conn| Ok(queries::get_restaurant(conn, id)?))
            .await
    }

    pub async fn booking(&self, booking_id: BookingId) -> Result<Option<Booking>, StoreError> {
        self.store
            .call("get_booking", move |conn| Ok(queries::get_booking(conn, booking_id)?))
            .await
    }
}

#[async_trait]
impl Reservations for BookingService {
    async fn resolve_restaurant(
        &self,
        name_or_id: &str,
        city: Option<&str>,
    ) -> Result<Option<i64>, StoreError> {
        let name = name_or_id.trim().to_string();
        let city = city.map(str::to_string);

        self.store
            .call("resolve_restaurant", move |conn| {
                if let Ok(id) = name.parse::<i64>() {
                    if queries::restaurant_exists(conn, id)? {
                        return Ok(Some(id));
                    }
                }
                Ok(queries::find_restaurant_id(conn, &name, city.as_deref())?)
            })
            .await
    }

    async fn available_slots(
        &self,
        restaurant_id: i64,
        date: NaiveDate,
    ) -> Result<Availability, StoreError> {
        self.store
            .call("available_slots", move |conn| {
                let catalog = queries::get_slot_catalog(conn, restaurant_id)?;
                let booked = queries::get_booked_slots(conn, restaurant_id, date)?;
                Ok(Availability::derive(restaurant_id, date, &catalog, &booked))
            })
            .await
    }

    async fn reserve(&self, request: ReservationRequest) -> Result<Booking, StoreError> {
        let restaurant_id = request.restaurant_id;
        let date = request.date;
        let slot = request.slot.clone();

        let result = self
            .store
            .call("reserve", move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                if !queries::restaurant_exists(&tx, request.restaurant_id)? {
                    return Err(StoreError::NotFound(format!(
                        "restaurant {}",
                        request.restaurant_id
                    )));
                }

                let catalog = queries::get_slot_catalog(&tx, request.restaurant_id)?;
                if !catalog.contains(&request.slot) {
                    return Err(StoreError::NotFound(format!(
                        "slot {:?} at restaurant {}",
                        request.slot, request.restaurant_id
                    )));
                }

                let booking = match queries::insert_booking(&tx, &request) {
                    Ok(booking) => booking,
                    Err(e) if is_unique_violation(&e) => return Err(StoreError::Conflict),
                    Err(e) => return Err(e.into()),
                };

                tx.commit()?;
                Ok(booking)
            })
            .await;

        match &result {
            Ok(booking) => tracing::info!(
                booking_id = booking.booking_id,
                restaurant_id,
                %date,
                slot = %slot,
                "booking created"
            ),
            Err(StoreError::Conflict) => {
                tracing::info!(restaurant_id, %date, slot = %slot, "slot already taken")
            }
            Err(e) => tracing::warn!(restaurant_id, %date, slot = %slot, error = %e, "reserve failed"),
        }

        result
    }

    async fn cancel(&self, booking_id: BookingId) -> Result<bool, StoreError> {
        let removed = self
            .store
            .call("cancel", move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let removed = queries::delete_booking(&tx, booking_id)?;
                tx.commit()?;
                Ok(removed)
            })
            .await?;

        tracing::info!(booking_id, removed, "cancel processed");
        Ok(removed)
    }

    async fn bookings_for_contact(
        &self,
        contact_number: &str,
        contact_email: &str,
    ) -> Result<Vec<BookingSummary>, StoreError> {
        let number = contact_number.trim().to_string();
        let email = contact_email.trim().to_string();

        self.store
            .call("bookings_for_contact", move |conn| {
                Ok(queries::get_bookings_for_contact(conn, &number, &email)?)
            })
            .await
    }
}
