#![forbid(unsafe_code)]

pub mod config;
pub mod gateway;
pub mod http;
pub mod identity;
pub mod memory;

pub use config::{ApiConfig, ConfigError};
pub use gateway::{
    AnswerOracle, AnswerSink, ApiError, Backend, BackendHealth, ExamProvider, GradingService,
    OracleAnswer, PausePersistence, PauseSnapshot, QuestionProvider,
};
pub use http::HttpBackend;
pub use identity::SessionIdentity;
pub use memory::{CallCounts, FailureSwitches, InMemoryBackend};
