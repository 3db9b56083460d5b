//! Host-facing RPC surface.
//!
//! One POST route per named function of the bridge contract. Request and
//! response bodies are pair-list JSON; every response carries
//! `status ∈ {"ok","error"}` and the handlers never panic or propagate —
//! a failing engine call becomes an error envelope.

mod envelope;
mod handlers;
mod routes;

pub use envelope::{envelope_error, envelope_ok};
pub use routes::create_router;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::engine::EngineState;

/// Shared handle to the (possibly uninitialized) engine.
///
/// The mutex is the engine's cooperative scheduler: snapshot ingestion and
/// admin calls serialize through it, so there is no shared mutable state
/// beyond this one owner.
#[derive(Clone)]
pub struct EngineHandle {
    pub engine: Arc<Mutex<Option<EngineState>>>,
    pub log_dir: PathBuf,
}

impl EngineHandle {
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            engine: Arc::new(Mutex::new(None)),
            log_dir,
        }
    }
}
