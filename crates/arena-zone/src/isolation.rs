//! Containment for panicking collaborators.
//!
//! Spawners and the lifecycle service are host code. A panic inside one
//! of them is caught at the call site and reported like any other
//! collaborator failure, so it never unwinds through the registry lock or
//! out of a scan.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Run a collaborator call, returning the panic message if it panicked.
///
/// Callers must only pass closures whose captured state is left
/// consistent when they unwind: every registry call site mutates its map
/// after the collaborator returns.
pub fn catch_collaborator<T>(call: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(call)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    payload
        .downcast_ref::<String>()
        .cloned()
        .unwrap_or_else(|| String::from("non-string panic payload"))
}
