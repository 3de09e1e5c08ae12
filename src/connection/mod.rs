//! The connection actor and its building blocks
//!
//! - [`state`] and [`backoff`] are pure: state records and decisions
//! - [`protocol`] stamps outbound and inspects inbound envelopes
//! - [`actor`] runs the mailbox loop and performs side effects
//! - [`handle`] is what callers hold

pub mod actor;
pub mod backoff;
pub mod events;
pub mod handle;
pub mod protocol;
pub mod scheduler;
pub mod state;

pub use actor::{ActorSettings, ConnectionActor, ConnectionCommand};
pub use backoff::ReconnectPolicy;
pub use events::{ConnectionEvent, Subscription};
pub use handle::ConnectionHandle;
pub use protocol::{ProtocolError, WireProtocol};
pub use scheduler::{Scheduler, TimerHandle, TokioScheduler};
pub use state::{ConnectionState, ConnectionStatus};
