mod error;
mod event;
mod session;

pub use error::{Error, Result, ValidationError};
pub use event::{
    BashCommandEvent, Event, EventKind, FileOperationEvent, SessionStartEvent, SkipEvent,
    TextEvent, ToolCallEvent, TokenUsageEvent,
};
pub use session::{
    BashCommandRecord, BehavioralMetrics, CacheEntry, FileOperationRecord, IngestOffset, Session,
    SessionData, TokenUsageSummary, ToolExecution,
};
