//! Order intake: parser, sandbox, resource pool, waypoint expansion.
//!
//! Everything the LLM sends back passes through here before it can touch
//! the command queue. The parser is tolerant (bad orders are dropped, the
//! rest survive); the sandbox is strict (first failing layer rejects).

pub mod parser;
pub mod resource_pool;
pub mod sandbox;
pub mod waypoints;

pub use parser::{parse_reply, serialize_reply, ParsedReply};
pub use resource_pool::{PoolRejection, ResourcePool};
pub use sandbox::{RejectionKind, Sandbox, SandboxInputs, ValidationOutcome};
