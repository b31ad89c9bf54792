//! Execution layer for the webpilot agent.
//!
//! This crate owns everything between a [`Decision`] and the page it acts
//! on: the sensing/control port traits, the error taxonomy with
//! retryability classification, the explicit retry policy, the
//! [`ActionExecutor`] that carries decisions out with scroll-into-view,
//! stability waits, retries, and the force-click fallback, plus the
//! hermetic scripted driver used for training mode and tests.
//!
//! [`Decision`]: webpilot_core_types::Decision

pub mod errors;
pub mod executor;
pub mod ports;
pub mod retry;
pub mod scripted;
pub mod session_state;

pub use errors::ActionError;
pub use executor::{ActionExecutor, ExecutorConfig};
pub use ports::{ControlPort, LiveHandle, SensePort};
pub use retry::RetryPolicy;
pub use scripted::{ScriptedDriver, ScriptedElement, ScriptedFixture, ScriptedFrame};
pub use session_state::{SessionState, SessionStateError, SessionStateStore};
