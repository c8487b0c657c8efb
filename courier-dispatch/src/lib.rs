//! Campaign dispatch across a pool of SMTP submission endpoints
//!
//! This crate provides:
//! - Endpoint loading and round-robin rotation
//! - Health probing before an endpoint is used
//! - Adaptive per-endpoint pacing and sending windows
//! - Classification of failures into actionable reports
//! - The dispatch loop tying these together

mod classify;
mod content;
mod dispatcher;
mod endpoint;
mod error;
mod health;
mod pool;
mod sink;
mod smtp;
mod throttle;
mod transport;
mod types;
mod window;

pub use classify::{
    ErrorCategory, ErrorReport, Severity, categorize, classify, extract_status_code,
    get_retry_delay,
};
pub use content::{ContentError, ContentProducer, StaticContent};
pub use dispatcher::{DispatchOptions, Dispatcher, run};
pub use endpoint::{Endpoint, EndpointFile, EndpointId, Secret, load_endpoints, parse_endpoints};
pub use error::{ConfigError, DispatchError, LineError, WindowError};
pub use health::{HealthChecker, HealthConfig, HealthProbe, Verification};
pub use pool::EndpointPool;
pub use sink::{OutcomeSink, SinkError, TracingSink};
pub use smtp::{SmtpProbe, SmtpSettings, SmtpTransport};
pub use throttle::{Throttle, ThrottleConfig, ThrottleStats};
pub use transport::{Envelope, Receipt, Stage, Transport, TransportError};
pub use types::{CampaignResult, Message, Outcome, RunStatus, SendAttempt};
pub use window::{Clock, ManualClock, PauseDecision, PauseReason, SendingWindow, SystemClock, WindowConfig};
