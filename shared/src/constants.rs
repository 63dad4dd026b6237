/// Bytes overwritten at a 64-bit target: `mov r11, imm64` (10) + `jmp r11` (3).
pub const X64_PATCH_LEN: usize = 13;

/// Bytes overwritten at a 32-bit target: `push imm32` (5) + `ret` (1).
pub const X86_PATCH_LEN: usize = 6;

/// Environment variable that overrides where the demo looks for its TOML config.
pub const CONFIG_ENV_VAR: &str = "HOOK_DEMO_CONFIG";

/// Config file name looked up next to the running executable.
pub const CONFIG_FILE_NAME: &str = "config.toml";
