//! Nokia SR OS Classic CLI profile.
//!
//! Classic CLI applies configuration immediately; there is no candidate
//! datastore. Safety comes from the `admin rollback` checkpoint facility
//! (see [`SrosCheckpoints`](crate::checkpoint::SrosCheckpoints)).
//!
//! # Prompt Examples
//!
//! ```text
//! A:router#                            # exec
//! *A:router#                           # exec with unsaved changes
//! *A:router>config#                    # config context
//! A:router>config>router>bgp#          # deeper context
//! ```
//!
//! The leading `*` is the change indicator used by light mode.
//!
//! Prompt patterns adapted from
//! [scrapli](https://github.com/scrapli/scrapli_community/blob/main/scrapli_community/nokia/sros/nokia_sros.py).

use super::DeviceProfile;
use crate::error::Result;

/// Profile name for Nokia SR OS Classic CLI.
pub const PROFILE_NAME: &str = "nokia_sros_classic";

/// Prefix the prompt carries while the running config has unsaved changes.
pub const CHANGE_INDICATOR: &str = "*";

/// Classic prompt: optional `*`, CPM slot, host name, optional context, `#` or `$`.
const CLASSIC_PROMPT: &str = r"(?m)^\*?[ABCDabcd]:[\w._-]+(?:>[\w>. -]+)?[#$]\s?$";

/// Create the Nokia SR OS Classic CLI profile.
pub fn classic() -> Result<DeviceProfile> {
    Ok(DeviceProfile::new(PROFILE_NAME, CLASSIC_PROMPT)?
        .with_on_open_command("environment no more")
        .with_failure_pattern("MINOR:")
        .with_failure_pattern("MAJOR:")
        .with_failure_pattern("CRITICAL:")
        .with_failure_pattern("Error:")
        .with_failure_pattern("Bad Command:")
        .with_terminal_size(512, 24))
}
