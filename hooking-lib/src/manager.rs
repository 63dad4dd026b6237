use crate::arch::Architecture;
use crate::encoder::JumpPatch;
use crate::hooks::{HookRecord, Routine, TargetAddress};
use crate::memory::{CodeMemory, ProcessMemory};
use crate::registry::HookRegistry;
use log::{debug, error};
use shared::errors::{ArgumentError, HookError};

/// Installs and removes inline jump hooks, remembering the entry bytes each
/// patch overwrote.
///
/// Every target is either *unhooked* (not in the registry, original bytes in
/// place) or *hooked* (registered, entry overwritten with a jump to the
/// replacement). There is no call-through to the original: a replacement that
/// needs the original behavior has to reimplement it.
///
/// The manager is not internally synchronized. Share one instance behind a
/// lock when several threads hook, and make sure no thread is executing a
/// target while it is being patched or restored.
///
/// Typical usage:
///
/// ```rust,no_run
/// use hooking_lib::{HookManager, Routine};
///
/// extern "C" fn add(a: i32, b: i32) -> i32 { a + b }
/// extern "C" fn add_plus_one(a: i32, b: i32) -> i32 { a + b + 1 }
///
/// let mut mgr = HookManager::new()?;
/// unsafe {
///     mgr.hook(Routine::plain(add as usize), Routine::plain(add_plus_one as usize))?;
///     // calls to `add` now run `add_plus_one`
///     mgr.unhook(add as usize)?;
/// }
/// # Ok::<(), hooking_lib::HookError>(())
/// ```
pub struct HookManager<M: CodeMemory = ProcessMemory> {
    arch: Architecture,
    memory: M,
    registry: HookRegistry,
}

impl HookManager {
    /// Creates a manager for the current process.
    ///
    /// Fails with [`HookError::UnsupportedPlatform`] unless the process is
    /// x86/x86-64 running on an OS with a protection backend.
    pub fn new() -> Result<Self, HookError> {
        let arch = Architecture::detect()?;
        let memory = ProcessMemory::new()?;
        debug!("hook manager ready for {arch} (page size {})", memory.page_size());
        Ok(Self::with_memory(arch, memory))
    }
}

impl<M: CodeMemory> HookManager<M> {
    /// Creates a manager over an explicit memory backend.
    pub fn with_memory(arch: Architecture, memory: M) -> Self {
        Self {
            arch,
            memory,
            registry: HookRegistry::new(arch.patch_len()),
        }
    }

    pub fn architecture(&self) -> Architecture {
        self.arch
    }

    /// Bytes saved and overwritten per hook.
    pub fn patch_len(&self) -> usize {
        self.arch.patch_len()
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Redirects every call to `original` into `replacement`.
    ///
    /// All argument and state checks run before anything is read or written:
    ///
    /// - [`HookError::InvalidArgument`] for a null address, a self-hook, an
    ///   original that is generic or generated, a replacement that is not a
    ///   plain routine, an original whose patch span overlaps an installed
    ///   hook, or a replacement the architecture cannot jump to.
    /// - [`HookError::AlreadyHooked`] if `original` is already registered.
    ///
    /// A [`HookError::NativeApiFailure`] from the memory layer is returned as
    /// is. The registry is left without an entry for `original`, but its entry
    /// bytes may already be patched; treat the target as indeterminate.
    ///
    /// # Safety
    ///
    /// - Both addresses must be entry points of live code that stays mapped
    ///   and unmoved while the hook is installed.
    /// - `replacement` must use the same calling convention as `original`,
    ///   taking the receiver as explicit first parameter when `original` is a
    ///   method.
    /// - `original` must be at least [`Self::patch_len`] bytes long, or the
    ///   patch will run into whatever follows it.
    /// - No thread may be executing inside `original` during the call.
    pub unsafe fn hook(&mut self, original: Routine, replacement: Routine) -> Result<(), HookError> {
        self.validate(&original, &replacement)?;

        let target = original.address();
        if self.registry.contains(target) {
            return Err(HookError::AlreadyHooked { target: target.get() });
        }
        if let Some(existing) = self.registry.overlapping(target) {
            return Err(ArgumentError::OverlappingHook { existing: existing.get() }.into());
        }
        let patch = JumpPatch::encode(self.arch, replacement.address())?;

        let saved = unsafe { self.memory.read(target, patch.len())? };
        unsafe { self.memory.write(target, patch.as_bytes())? };
        self.registry
            .insert(HookRecord::new(target, replacement.address(), saved))?;

        debug!(
            "hooked {target} -> {} ({} bytes saved)",
            replacement.address(),
            patch.len()
        );
        Ok(())
    }

    /// Writes back the bytes saved by [`Self::hook`] and forgets the hook.
    ///
    /// - [`HookError::InvalidArgument`] for a null address.
    /// - [`HookError::NotHooked`] if `original` is not registered.
    /// - [`HookError::NativeApiFailure`] leaves the record registered; the
    ///   hook should be treated as stuck rather than retried blindly.
    ///
    /// # Safety
    ///
    /// No thread may be executing inside `original` during the call.
    pub unsafe fn unhook(&mut self, original: impl Into<TargetAddress>) -> Result<(), HookError> {
        let target = original.into();
        if target.is_null() {
            return Err(ArgumentError::NullOriginal.into());
        }
        let record = self
            .registry
            .get(target)
            .ok_or(HookError::NotHooked { target: target.get() })?;

        unsafe { self.memory.write(target, record.saved_bytes())? };
        self.registry.remove(target);

        debug!("unhooked {target}");
        Ok(())
    }

    /// Removes every installed hook.
    ///
    /// Stops at the first failure and returns it; that target and any not yet
    /// visited stay registered.
    ///
    /// # Safety
    ///
    /// Same as [`Self::unhook`], for every registered target.
    pub unsafe fn unhook_all(&mut self) -> Result<(), HookError> {
        let targets: Vec<_> = self.registry.targets().collect();
        for target in targets {
            unsafe { self.unhook(target)? };
        }
        Ok(())
    }

    pub fn is_hooked(&self, original: impl Into<TargetAddress>) -> bool {
        self.registry.contains(original.into())
    }

    /// The live hook on `original`, if any.
    pub fn record(&self, original: impl Into<TargetAddress>) -> Option<&HookRecord> {
        self.registry.get(original.into())
    }

    pub fn hooked_targets(&self) -> impl Iterator<Item = TargetAddress> + '_ {
        self.registry.targets()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    fn validate(&self, original: &Routine, replacement: &Routine) -> Result<(), ArgumentError> {
        if original.address().is_null() {
            return Err(ArgumentError::NullOriginal);
        }
        if replacement.address().is_null() {
            return Err(ArgumentError::NullReplacement);
        }
        if original.address() == replacement.address() {
            return Err(ArgumentError::SelfHook);
        }
        if !original.shape().is_patchable() {
            return Err(ArgumentError::UnsupportedOriginal(original.shape()));
        }
        if !replacement.shape().is_valid_replacement() {
            return Err(ArgumentError::UnsupportedReplacement(replacement.shape()));
        }
        Ok(())
    }
}

impl<M: CodeMemory> Drop for HookManager<M> {
    /// Restores whatever is still hooked. Failures cannot be returned from
    /// here, so they are logged.
    fn drop(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        debug!("restoring {} hook(s) on drop", self.registry.len());
        if let Err(e) = unsafe { self.unhook_all() } {
            error!("failed to restore hooks on drop: {e}");
        }
    }
}
