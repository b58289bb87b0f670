// Exit codes for precise CI triage
use beamscore_common::{ErrorKind, ScoreError};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_GENERIC_FAIL: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_DECODING: i32 = 3;
pub const EXIT_IO: i32 = 4;

/// Exit code for a failed command, from the first [`ScoreError`] in the chain.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    let kind = err.chain().find_map(|cause| cause.downcast_ref::<ScoreError>()).map(ScoreError::kind);
    match kind {
        Some(ErrorKind::Configuration) => EXIT_CONFIG,
        Some(ErrorKind::Decoding) => EXIT_DECODING,
        Some(ErrorKind::Io) => EXIT_IO,
        None => EXIT_GENERIC_FAIL,
    }
}
