//! Error handler: classify the recorded fault and decide whether the run
//! may continue.
//!
//! Unrecoverable faults pass straight through to the responder, which
//! renders the user-safe error reply. Recoverable faults are absorbed so
//! downstream nodes can proceed; in practice those are already kept inside
//! agent outcomes and rarely reach the state-level fault slot.

use tracing::{debug, info, warn};

use crate::context::Context;
use crate::state::RequestState;

pub(crate) const NODE: &str = "error_handler";

/// Run the handler against the state record.
pub(crate) async fn run(state: &mut RequestState, _ctx: &Context) {
    match &state.fault {
        Some(fault) if !fault.recoverable => {
            warn!(
                request_id = %state.request_id,
                kind = %fault.kind,
                node = %fault.node,
                message = %fault.message,
                "unrecoverable fault, responding with error"
            );
        }
        Some(fault) => {
            info!(
                request_id = %state.request_id,
                kind = %fault.kind,
                node = %fault.node,
                "recoverable fault absorbed"
            );
            state.fault = None;
        }
        None => {
            debug!(request_id = %state.request_id, "error handler reached without a fault");
        }
    }
}
