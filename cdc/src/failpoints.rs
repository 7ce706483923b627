use fail::fail_point;

use crate::bail;
use crate::error::{CdcResult, ErrorKind};

/// Evaluated right before the local-resolved worker writes the sub-changefeed info.
pub const PROCESSOR_PERSIST_BEFORE_WRITE: &str = "processor.persist.before_write";

/// Evaluated before every read of the changefeed's global status.
pub const PROCESSOR_GLOBAL_RESOLVED_BEFORE_READ: &str = "processor.global_resolved.before_read";

/// Returns an error when the named failpoint is armed with `return`.
pub fn cdc_fail_point(name: &str) -> CdcResult<()> {
    fail_point!(name, |_| {
        bail!(
            ErrorKind::FailpointTriggered,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
