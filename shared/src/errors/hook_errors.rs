use crate::routine::RoutineShape;
use std::io;
use thiserror::Error;

/// Everything that can go wrong while installing or removing a hook.
///
/// Callers are expected to separate environment failures
/// ([`HookError::is_environmental`]) from API misuse ([`HookError::is_misuse`]).
#[derive(Error, Debug)]
pub enum HookError {
    /// The running machine or OS cannot be patched by this engine.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Rejected before any memory or registry mutation.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] ArgumentError),

    #[error("target {target:#x} is already hooked")]
    AlreadyHooked { target: usize },

    #[error("target {target:#x} was never hooked")]
    NotHooked { target: usize },

    /// An OS memory-protection or cache call failed. The protection state of
    /// the region is unknown afterwards; nothing is retried or rolled back.
    #[error("{api} failed at {address:#x}: {source}")]
    NativeApiFailure {
        api: &'static str,
        address: usize,
        #[source]
        source: io::Error,
    },
}

impl HookError {
    /// The host cannot support patching right now.
    pub fn is_environmental(&self) -> bool {
        matches!(
            self,
            HookError::UnsupportedPlatform(_) | HookError::NativeApiFailure { .. }
        )
    }

    /// The caller used the API incorrectly.
    pub fn is_misuse(&self) -> bool {
        !self.is_environmental()
    }
}

/// Reasons a `hook`/`unhook` argument is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("original routine address is null")]
    NullOriginal,

    #[error("replacement routine address is null")]
    NullReplacement,

    #[error("a routine cannot hook itself")]
    SelfHook,

    #[error("original routine is {0} and cannot be patched")]
    UnsupportedOriginal(RoutineShape),

    #[error("replacement routine must be plain, got {0}")]
    UnsupportedReplacement(RoutineShape),

    #[error("patch span overlaps the hook already installed at {existing:#x}")]
    OverlappingHook { existing: usize },

    #[error("replacement {replacement:#x} does not fit a {bits}-bit jump")]
    UnencodableReplacement { replacement: usize, bits: u32 },
}
