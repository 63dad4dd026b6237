//! Inline function hooks for x86 and x86-64 processes.
//!
//! The first bytes of an already compiled routine are overwritten with an
//! absolute jump to a replacement routine; the overwritten bytes are kept so
//! the hook can be removed again. See [`HookManager`] for the entry point.

mod arch;
mod encoder;
mod hooks;
mod manager;
mod memory;
mod registry;

pub use arch::Architecture;
pub use encoder::JumpPatch;
pub use hooks::{HookRecord, Routine, TargetAddress};
pub use manager::HookManager;
pub use memory::{CodeMemory, ProcessMemory};
pub use shared::errors::{ArgumentError, HookError};
pub use shared::routine::RoutineShape;
