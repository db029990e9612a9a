//! Exit codes for the `consent` binary.
//! Scripts branch on these, keep them stable.

pub const SUCCESS: i32 = 0;
pub const REJECTED: i32 = 1; // Operation answered false or subject unknown
pub const CONFIG_ERROR: i32 = 2; // Missing paths or unusable configuration

/// Map a boolean answer to an exit code.
pub fn from_bool(ok: bool) -> i32 {
    if ok {
        SUCCESS
    } else {
        REJECTED
    }
}
