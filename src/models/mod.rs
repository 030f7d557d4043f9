pub mod availability;
pub mod booking;
pub mod conversation;
pub mod intent;
pub mod restaurant;

pub use availability::Availability;
pub use booking::{Booking, BookingId, BookingSummary, Contact, ReservationRequest};
pub use conversation::{Conversation, DialogueStage, Field, Reply, TurnOutcome};
pub use intent::{ExtractedEntities, ExtractedIntent, Intent};
pub use restaurant::Restaurant;
