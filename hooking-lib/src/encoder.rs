//! Encodes the absolute jump written over a hooked routine's entry.
//!
//! x64 (13 bytes):
//!
//! ```text
//!   49 BB <imm64>     ; mov r11, replacement
//!   41 FF E3          ; jmp r11
//! ```
//!
//! x86 (6 bytes):
//!
//! ```text
//!   68 <imm32>        ; push replacement
//!   C3                ; ret
//! ```
//!
//! Both forms are absolute, so the replacement may live anywhere in the
//! address space. r11 is caller-saved and never carries arguments in the
//! SysV or Microsoft x64 conventions.

use crate::arch::Architecture;
use crate::hooks::TargetAddress;
use shared::constants::{X64_PATCH_LEN, X86_PATCH_LEN};
use shared::errors::{ArgumentError, HookError};

const MOV_R11_IMM64: [u8; 2] = [0x49, 0xBB];
const JMP_R11: [u8; 3] = [0x41, 0xFF, 0xE3];
const PUSH_IMM32: u8 = 0x68;
const RET: u8 = 0xC3;

/// The patch for one architecture. Its length is fixed by the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpPatch {
    X86([u8; X86_PATCH_LEN]),
    X64([u8; X64_PATCH_LEN]),
}

impl JumpPatch {
    /// Builds the jump to `replacement` for `arch`.
    ///
    /// Only fails for x86 when the address needs more than 32 bits.
    pub fn encode(arch: Architecture, replacement: TargetAddress) -> Result<Self, HookError> {
        match arch {
            Architecture::X64 => Ok(Self::X64(encode_x64(replacement.get() as u64))),
            Architecture::X86 => {
                let imm = u32::try_from(replacement.get()).map_err(|_| {
                    ArgumentError::UnencodableReplacement {
                        replacement: replacement.get(),
                        bits: arch.pointer_width(),
                    }
                })?;
                Ok(Self::X86(encode_x86(imm)))
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::X86(b) => b,
            Self::X64(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

fn encode_x64(target: u64) -> [u8; X64_PATCH_LEN] {
    let mut patch = [0u8; X64_PATCH_LEN];
    patch[..2].copy_from_slice(&MOV_R11_IMM64);
    patch[2..10].copy_from_slice(&target.to_le_bytes());
    patch[10..].copy_from_slice(&JMP_R11);
    patch
}

fn encode_x86(target: u32) -> [u8; X86_PATCH_LEN] {
    let mut patch = [0u8; X86_PATCH_LEN];
    patch[0] = PUSH_IMM32;
    patch[1..5].copy_from_slice(&target.to_le_bytes());
    patch[5] = RET;
    patch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn x64_is_mov_r11_then_jmp_r11() {
        let p = JumpPatch::encode(Architecture::X64, TargetAddress::new(0x1122_3344_5566_7788))
            .unwrap();
        #[rustfmt::skip]
        let expected = [
            0x49, 0xBB,
            0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11,
            0x41, 0xFF, 0xE3,
        ];
        assert_eq!(p.as_bytes(), &expected);
        assert_eq!(p.len(), Architecture::X64.patch_len());
    }

    #[test]
    fn x86_is_push_then_ret() {
        let p = JumpPatch::encode(Architecture::X86, TargetAddress::new(0xCAFE_BABE)).unwrap();
        assert_eq!(p.as_bytes(), &[0x68, 0xBE, 0xBA, 0xFE, 0xCA, 0xC3]);
        assert_eq!(p.len(), Architecture::X86.patch_len());
    }

    #[test]
    fn encoding_is_deterministic() {
        let target = TargetAddress::new(0x4010_20);
        for arch in [Architecture::X86, Architecture::X64] {
            let a = JumpPatch::encode(arch, target).unwrap();
            let b = JumpPatch::encode(arch, target).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn x86_rejects_wide_address() {
        let wide = TargetAddress::new(0x1_0000_0000);
        assert!(matches!(
            JumpPatch::encode(Architecture::X86, wide),
            Err(HookError::InvalidArgument(ArgumentError::UnencodableReplacement { bits: 32, .. }))
        ));
    }
}
