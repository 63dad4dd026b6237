//! Instruction-set detection for the running process.

use shared::constants::{X64_PATCH_LEN, X86_PATCH_LEN};
use shared::errors::HookError;
use std::fmt;

/// The two Intel-compatible families the engine can patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    /// 32-bit x86, patched with `push imm32; ret`.
    X86,
    /// 64-bit x86-64, patched with `mov r11, imm64; jmp r11`.
    X64,
}

impl Architecture {
    /// Detects the architecture this process was compiled for.
    ///
    /// Fails with [`HookError::UnsupportedPlatform`] on anything that is not
    /// x86 or x86-64.
    pub fn detect() -> Result<Self, HookError> {
        Self::from_machine(std::env::consts::ARCH)
    }

    /// Maps a machine name as reported by `std::env::consts::ARCH`.
    pub fn from_machine(machine: &str) -> Result<Self, HookError> {
        match machine {
            "x86_64" => Ok(Self::X64),
            "x86" => Ok(Self::X86),
            other => Err(HookError::UnsupportedPlatform(format!(
                "only Intel x86/x86-64 processes can be hooked, found {other}"
            ))),
        }
    }

    /// Number of entry bytes overwritten (and saved) per hook.
    pub const fn patch_len(self) -> usize {
        match self {
            Self::X86 => X86_PATCH_LEN,
            Self::X64 => X64_PATCH_LEN,
        }
    }

    pub const fn pointer_width(self) -> u32 {
        match self {
            Self::X86 => 32,
            Self::X64 => 64,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X86 => f.write_str("x86"),
            Self::X64 => f.write_str("x86_64"),
        }
    }
}
