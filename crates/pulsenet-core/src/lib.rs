//! Client-side networking core: a resilient session over a single TCP
//! connection with framing, a priority send queue, acknowledgement
//! tracking, heartbeats, reconnection and quality telemetry.

pub mod ack;
pub mod config;
pub mod dispatch;
pub mod framer;
pub mod heartbeat;
pub mod message;
pub mod metrics;
pub mod quality;
pub mod queue;
pub mod reconnect;
pub mod record;
pub mod session;
pub mod state;

pub use config::SessionConfig;
pub use dispatch::{DispatchOutcome, Handler, HandlerError};
pub use message::Vec3;
pub use metrics::ConnectionMetrics;
pub use quality::{QualityMetrics, Recommendation};
pub use reconnect::ReconnectPolicy;
pub use record::{DeliveryOutcome, SendOptions};
pub use session::{Session, SessionError};
pub use state::{ConnectionError, ConnectionState};
