pub mod capability;
pub mod hud;
pub mod memory;
pub mod router;
pub mod session;
pub mod tools;

pub use capability::{Capability, CapabilityClient, ModelTier};
pub use session::{Action, Orchestrator, SessionPhase};
