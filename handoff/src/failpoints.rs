use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, HandoffResult};

/// Evaluated by stage workers right before an item's transform runs.
pub const STAGE_WORKER__BEFORE_TRANSFORM: &str = "stage_worker.before_transform";

/// Evaluated by the dispatcher before each item is put on the first queue.
pub const DISPATCHER__BEFORE_PUT: &str = "dispatcher.before_put";

/// Evaluates the fail point `name`.
///
/// When the fail point is configured with `return`, an error is returned. The optional parameter
/// selects its kind: `invalid_data` gives [`ErrorKind::InvalidData`], anything else
/// [`ErrorKind::TransformFailed`].
pub fn handoff_fail_point(name: &str) -> HandoffResult<()> {
    fail_point!(name, |parameter| {
        let error_kind = match parameter.as_deref() {
            Some("invalid_data") => ErrorKind::InvalidData,
            _ => ErrorKind::TransformFailed,
        };

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
