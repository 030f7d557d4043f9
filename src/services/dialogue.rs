use std::time::Duration;

use crate::errors::StoreError;
use crate::models::{
    Availability, BookingSummary, Contact, Conversation, DialogueStage, ExtractedEntities, Field,
    Intent, Reply, ReservationRequest, TurnOutcome,
};
use crate::services::ai::extraction::extract_intent;
use crate::services::ai::LlmProvider;
use crate::services::booking::Reservations;
use crate::services::recommend::Recommender;
use crate::services::validation::validate_field;

const GREETING: &str = "Hello! How can I assist you with your restaurant booking today?";
const FALLBACK: &str =
    "Sorry, I didn't understand that. Could you rephrase, or tell me if you'd like to book or cancel?";
const STORE_DOWN: &str =
    "Sorry, our booking system is unavailable right now. Please try again in a little while.";
const GIVE_UP: &str =
    "Let's stop here for now. Send a new message whenever you'd like to start again.";

#[derive(Debug, Clone)]
pub struct DialoguePolicy {
    /// Consecutive invalid answers tolerated before the attempt ends.
    pub max_retries: u32,
    pub extraction_timeout: Duration,
    pub recommender_timeout: Duration,
    pub recommendations: usize,
}

impl Default for DialoguePolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            extraction_timeout: Duration::from_secs(15),
            recommender_timeout: Duration::from_secs(10),
            recommendations: 3,
        }
    }
}

pub struct Turn {
    pub conversation: Conversation,
    pub reply: Reply,
}

/// Per-conversation slot-filling state machine.
///
/// A turn takes the current [`Conversation`] and the user's text and returns
/// the next conversation plus a reply. Text is sent to the extraction service
/// only when no question is pending; otherwise it is the literal answer to
/// that question. Failures never escape a turn: they become replies and
/// stage transitions.
pub struct DialogueController<'a> {
    llm: &'a dyn LlmProvider,
    reservations: &'a dyn Reservations,
    recommender: &'a dyn Recommender,
    policy: DialoguePolicy,
}

impl<'a> DialogueController<'a> {
    pub fn new(
        llm: &'a dyn LlmProvider,
        reservations: &'a dyn Reservations,
        recommender: &'a dyn Recommender,
        policy: DialoguePolicy,
    ) -> Self {
        Self {
            llm,
            reservations,
            recommender,
            policy,
        }
    }

    pub async fn handle_turn(&self, mut conv: Conversation, text: &str) -> Turn {
        if conv.stage.is_terminal() {
            conv.restart();
        }
        let from = conv.stage;

        let reply = match conv.stage {
            DialogueStage::Collecting | DialogueStage::CancelCollecting => {
                self.on_field_value(&mut conv, text).await
            }
            DialogueStage::AwaitSelection => self.on_slot_choice(&mut conv, text).await,
            DialogueStage::CancelList => self.on_cancel_choice(&mut conv, text).await,
            DialogueStage::Start
            | DialogueStage::Confirmed
            | DialogueStage::CancelConfirmed
            | DialogueStage::Ended
            | DialogueStage::Failed => self.on_fresh_message(&mut conv, text).await,
        };

        tracing::info!(
            session = %conv.session_id,
            from = from.as_str(),
            to = conv.stage.as_str(),
            asking = conv.asking.map(|f| f.key()),
            "dialogue turn"
        );

        Turn {
            conversation: conv,
            reply,
        }
    }

    async fn on_fresh_message(&self, conv: &mut Conversation, text: &str) -> Reply {
        let extraction = extract_intent(
            self.llm,
            text,
            conv.reference_date,
            self.policy.extraction_timeout,
        )
        .await;
        let status = extraction.status();
        let extracted = extraction.into_intent();

        tracing::info!(
            session = %conv.session_id,
            status,
            intent = extracted.intent.as_str(),
            entities = extracted.entities.fields.len(),
            "message classified"
        );

        match extracted.intent {
            Intent::Greeting => Reply::new(GREETING, TurnOutcome::Greeting),
            Intent::Booking => {
                conv.intent = Some(Intent::Booking);
                conv.stage = DialogueStage::Collecting;
                merge_entities(conv, &extracted.entities, &Field::BOOKING);
                self.advance_booking(conv).await
            }
            Intent::Cancel => {
                conv.intent = Some(Intent::Cancel);
                conv.stage = DialogueStage::CancelCollecting;
                merge_entities(conv, &extracted.entities, &Field::CANCEL);
                self.advance_cancel(conv).await
            }
            Intent::Other | Intent::Unknown => Reply::new(FALLBACK, TurnOutcome::Fallback),
        }
    }

    async fn on_field_value(&self, conv: &mut Conversation, text: &str) -> Reply {
        let Some(field) = conv.asking else {
            return self.advance(conv).await;
        };

        match validate_field(field, text) {
            Ok(value) => {
                conv.fields.insert(field, value);
                conv.asking = None;
                self.advance(conv).await
            }
            Err(e) => self.reject_field(conv, field, &e.to_string()),
        }
    }

    async fn advance(&self, conv: &mut Conversation) -> Reply {
        match conv.stage {
            DialogueStage::CancelCollecting => self.advance_cancel(conv).await,
            _ => self.advance_booking(conv).await,
        }
    }

    async fn advance_booking(&self, conv: &mut Conversation) -> Reply {
        if conv.restaurant_id.is_none() {
            if let Some(name) = conv.value(Field::RestaurantName).map(str::to_string) {
                let city = conv.value(Field::City).map(str::to_string);
                match self
                    .reservations
                    .resolve_restaurant(&name, city.as_deref())
                    .await
                {
                    Ok(Some(id)) => conv.restaurant_id = Some(id),
                    Ok(None) => {
                        conv.fields.remove(&Field::RestaurantName);
                        let reason = format!("Sorry, I couldn't find a restaurant matching \"{name}\".");
                        return self.reject_field(conv, Field::RestaurantName, &reason);
                    }
                    Err(e) => return self.fail(conv, e),
                }
            }
        }

        match conv.next_missing(&Field::BOOKING) {
            Some(field) => self.ask(conv, field).await,
            None => self.show_slots(conv, false).await,
        }
    }

    async fn advance_cancel(&self, conv: &mut Conversation) -> Reply {
        if let Some(field) = conv.next_missing(&Field::CANCEL) {
            return self.ask(conv, field).await;
        }

        let number = conv.value(Field::ContactNumber).unwrap_or_default().to_string();
        let email = conv.value(Field::ContactEmail).unwrap_or_default().to_string();

        match self.reservations.bookings_for_contact(&number, &email).await {
            Ok(bookings) if bookings.is_empty() => {
                conv.stage = DialogueStage::Ended;
                Reply::new(
                    "No bookings found for the provided details.",
                    TurnOutcome::NoBookings,
                )
            }
            Ok(bookings) => {
                conv.stage = DialogueStage::CancelList;
                conv.retries = 0;
                let message = format!(
                    "Here are your bookings:\n{}\nPlease enter the Booking ID you want to cancel.",
                    booking_listing(&bookings)
                );
                conv.fetched_bookings = bookings.clone();
                Reply::new(message, TurnOutcome::BookingList { bookings })
            }
            Err(e) => self.fail(conv, e),
        }
    }

    async fn ask(&self, conv: &mut Conversation, field: Field) -> Reply {
        conv.asking = Some(field);
        conv.retries = 0;

        let mut message = String::new();
        if field == Field::RestaurantName && !conv.recommendations_shown {
            conv.recommendations_shown = true;
            if let Some(list) = self.recommendations(conv).await {
                message.push_str(&list);
                message.push('\n');
            }
        }
        message.push_str(field.prompt());

        Reply::new(message, TurnOutcome::AskField { field })
    }

    fn reject_field(&self, conv: &mut Conversation, field: Field, reason: &str) -> Reply {
        conv.retries += 1;
        if conv.retries > self.policy.max_retries {
            return self.give_up(conv);
        }

        conv.asking = Some(field);
        Reply::new(
            format!("{reason} {}", field.prompt()),
            TurnOutcome::InvalidField { field },
        )
    }

    fn reject_choice(&self, conv: &mut Conversation, message: String) -> Reply {
        conv.retries += 1;
        if conv.retries > self.policy.max_retries {
            return self.give_up(conv);
        }
        Reply::new(message, TurnOutcome::InvalidSelection)
    }

    fn give_up(&self, conv: &mut Conversation) -> Reply {
        tracing::warn!(session = %conv.session_id, retries = conv.retries, "too many invalid answers");
        conv.stage = DialogueStage::Ended;
        conv.asking = None;
        Reply::new(GIVE_UP, TurnOutcome::RetriesExhausted)
    }

    fn fail(&self, conv: &mut Conversation, err: StoreError) -> Reply {
        tracing::error!(session = %conv.session_id, error = %err, "store failure ended the attempt");
        conv.stage = DialogueStage::Failed;
        conv.asking = None;
        Reply::new(
            STORE_DOWN,
            TurnOutcome::Failed {
                reason: err.to_string(),
            },
        )
    }

    /// Goes back to collecting when a detail needed for booking is missing
    /// or unusable.
    async fn recollect(&self, conv: &mut Conversation) -> Reply {
        conv.stage = DialogueStage::Collecting;
        conv.offered = None;
        if conv.restaurant_id.is_none() {
            conv.fields.remove(&Field::RestaurantName);
        }
        if conv.date().is_none() {
            conv.fields.remove(&Field::Date);
        }
        if conv.party_size().is_none() {
            conv.fields.remove(&Field::NumberOfPeople);
        }
        let field = conv
            .next_missing(&Field::BOOKING)
            .unwrap_or(Field::RestaurantName);
        self.ask(conv, field).await
    }

    async fn recommendations(&self, conv: &Conversation) -> Option<String> {
        let city = conv.value(Field::City);
        let cuisine = conv.value(Field::Cuisine);
        let mut query = format!(
            "{} restaurant in {}",
            cuisine.unwrap_or_default(),
            city.unwrap_or_default()
        );
        if !conv.features.is_empty() {
            query.push_str(&format!(" with {}", conv.features.join(", ")));
        }

        let lookup = self
            .recommender
            .recommend(&query, city, cuisine, self.policy.recommendations);
        match tokio::time::timeout(self.policy.recommender_timeout, lookup).await {
            Ok(Ok(recs)) if recs.is_empty() => Some("No matching restaurants found.".to_string()),
            Ok(Ok(recs)) => {
                let lines: Vec<String> = recs
                    .iter()
                    .enumerate()
                    .map(|(i, r)| format!("{}. {}", i + 1, r.describe()))
                    .collect();
                Some(format!(
                    "Here are some restaurants you might like:\n{}",
                    lines.join("\n")
                ))
            }
            Ok(Err(e)) => {
                tracing::warn!(session = %conv.session_id, error = %e, "recommendations failed");
                None
            }
            Err(_) => {
                tracing::warn!(session = %conv.session_id, "recommendations timed out");
                None
            }
        }
    }

    /// Presents fresh availability. `taken` means the previous choice lost a
    /// race and the list is being refreshed.
    async fn show_slots(&self, conv: &mut Conversation, taken: bool) -> Reply {
        let (Some(restaurant_id), Some(date)) = (conv.restaurant_id, conv.date()) else {
            return self.recollect(conv).await;
        };

        let availability = match self.reservations.available_slots(restaurant_id, date).await {
            Ok(availability) => availability,
            Err(e) => return self.fail(conv, e),
        };

        let preface = if taken {
            "Sorry, that slot was just taken.\n"
        } else {
            ""
        };

        if availability.is_empty() {
            conv.stage = DialogueStage::Ended;
            conv.asking = None;
            conv.offered = None;
            return Reply::new(
                format!("{preface}No slots available for the selected date."),
                TurnOutcome::NoSlots,
            );
        }

        let message = format!(
            "{preface}{}",
            slot_listing(&availability, conv.value(Field::Time))
        );
        let slots = availability.slots.clone();

        conv.stage = DialogueStage::AwaitSelection;
        conv.asking = None;
        conv.retries = 0;
        conv.offered = Some(availability);

        let outcome = if taken {
            TurnOutcome::SlotTaken { slots }
        } else {
            TurnOutcome::SlotOptions { slots }
        };
        Reply::new(message, outcome)
    }

    async fn on_slot_choice(&self, conv: &mut Conversation, text: &str) -> Reply {
        let Some(offered) = conv.offered.clone() else {
            return self.show_slots(conv, false).await;
        };

        let slot = text
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| offered.by_choice(n))
            .map(str::to_string);
        let Some(slot) = slot else {
            let message = format!(
                "Invalid choice, please select a slot number between 1 and {}.",
                offered.slots.len()
            );
            return self.reject_choice(conv, message);
        };

        let Some(request) = reservation_request(conv, slot) else {
            return self.recollect(conv).await;
        };

        match self.reservations.reserve(request).await {
            Ok(booking) => {
                conv.stage = DialogueStage::Confirmed;
                conv.offered = None;
                Reply::new(
                    format!(
                        "Booking confirmed! Your booking ID is: {}. See you on {} at {}.",
                        booking.booking_id, booking.date, booking.slot
                    ),
                    TurnOutcome::Confirmed {
                        booking_id: booking.booking_id,
                    },
                )
            }
            // The slot is gone either way, so offer what is left.
            Err(StoreError::Conflict | StoreError::NotFound(_)) => self.show_slots(conv, true).await,
            Err(e) => self.fail(conv, e),
        }
    }

    async fn on_cancel_choice(&self, conv: &mut Conversation, text: &str) -> Reply {
        let booking_id = text
            .trim()
            .trim_start_matches('#')
            .parse::<i64>()
            .ok()
            .filter(|id| conv.fetched_bookings.iter().any(|b| b.booking_id == *id));
        let Some(booking_id) = booking_id else {
            let message = format!(
                "Please enter one of the booking IDs listed above.\n{}",
                booking_listing(&conv.fetched_bookings)
            );
            return self.reject_choice(conv, message);
        };

        match self.reservations.cancel(booking_id).await {
            Ok(true) => {
                conv.stage = DialogueStage::CancelConfirmed;
                Reply::new(
                    format!("Booking {booking_id} cancelled successfully."),
                    TurnOutcome::Cancelled { booking_id },
                )
            }
            Ok(false) => {
                conv.stage = DialogueStage::Ended;
                Reply::new(
                    "No booking found with that ID.",
                    TurnOutcome::BookingNotFound { booking_id },
                )
            }
            Err(e) => self.fail(conv, e),
        }
    }
}

/// Fills fields that have no accepted value yet from an extraction.
///
/// Accepted values are never replaced, fields outside `allowed` are ignored
/// and guesses that fail validation are dropped. Returns the fields filled.
pub fn merge_entities(
    conv: &mut Conversation,
    entities: &ExtractedEntities,
    allowed: &[Field],
) -> Vec<Field> {
    let mut filled = vec![];

    for (&field, raw) in &entities.fields {
        if !allowed.contains(&field) || conv.fields.contains_key(&field) {
            continue;
        }
        match validate_field(field, raw) {
            Ok(value) => {
                conv.fields.insert(field, value);
                filled.push(field);
            }
            Err(e) => {
                tracing::debug!(field = field.key(), error = %e, "dropping extracted value");
            }
        }
    }

    if conv.features.is_empty() && allowed.contains(&Field::Cuisine) {
        conv.features = entities.features.clone();
    }

    filled
}

fn reservation_request(conv: &Conversation, slot: String) -> Option<ReservationRequest> {
    Some(ReservationRequest {
        restaurant_id: conv.restaurant_id?,
        date: conv.date()?,
        slot,
        contact: Contact {
            name: conv.value(Field::ContactName)?.to_string(),
            number: conv.value(Field::ContactNumber)?.to_string(),
            email: conv.value(Field::ContactEmail)?.to_string(),
        },
        party_size: conv.party_size()?,
    })
}

fn slot_listing(availability: &Availability, preferred: Option<&str>) -> String {
    let preferred = preferred.and_then(clock_minutes);
    let lines: Vec<String> = availability
        .slots
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            let marker = if preferred.is_some() && preferred == clock_minutes(slot) {
                " (your preferred time)"
            } else {
                ""
            };
            format!("{}. {slot}{marker}", i + 1)
        })
        .collect();

    format!(
        "Available slots on {}:\n{}\nChoose a slot number.",
        availability.date,
        lines.join("\n")
    )
}

/// Minutes past midnight for "19:00", "7 PM", "7:30pm" and the like.
fn clock_minutes(s: &str) -> Option<u32> {
    let s: String = s
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    let (body, offset) = match (s.strip_suffix("pm"), s.strip_suffix("am")) {
        (Some(body), _) => (body, Some(12)),
        (None, Some(body)) => (body, Some(0)),
        (None, None) => (s.as_str(), None),
    };

    let (hour, minute) = match body.split_once(':') {
        Some((h, m)) => (h.parse::<u32>().ok()?, m.parse::<u32>().ok()?),
        None => (body.parse::<u32>().ok()?, 0),
    };
    let hour = match offset {
        Some(_) if hour == 0 || hour > 12 => return None,
        Some(offset) => hour % 12 + offset,
        None => hour,
    };

    (hour < 24 && minute < 60).then_some(hour * 60 + minute)
}

fn booking_listing(bookings: &[BookingSummary]) -> String {
    bookings
        .iter()
        .map(|b| {
            format!(
                "Booking ID: {}\n  Restaurant ID: {}\n  Name: {}\n  Date: {}\n  Time Slot: {}",
                b.booking_id, b.restaurant_id, b.restaurant_name, b.date, b.slot
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
