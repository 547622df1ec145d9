pub mod daily_risk;
pub mod dispatcher;
pub mod notifier;
pub mod quality;
pub mod risk_sizer;
pub mod scheduler;
pub mod sqlite_store;
pub mod upstream;

pub use daily_risk::{DailyRiskTracker, TradeUpdate};
pub use dispatcher::{CommandDispatcher, PublishOutcome, ReportOutcome};
pub use notifier::TelegramNotifier;
pub use quality::{QualityScorer, ScoreBreakdown};
pub use risk_sizer::RiskSizer;
pub use scheduler::{Scheduler, TickReport};
pub use sqlite_store::SqliteStore;
pub use upstream::{BatchOutcome, SignalSource, Tagged, UpstreamError, UpstreamSignalClient};
