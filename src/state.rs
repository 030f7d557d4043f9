use crate::config::AppConfig;
use crate::db::Store;
use crate::services::ai::LlmProvider;
use crate::services::booking::BookingService;
use crate::services::recommend::Recommender;

pub struct AppState {
    pub store: Store,
    pub bookings: BookingService,
    pub config: AppConfig,
    pub llm: Box<dyn LlmProvider>,
    pub recommender: Box<dyn Recommender>,
}
