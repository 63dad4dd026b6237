//! Value types shared by the engine: target addresses, routine descriptors
//! and the per-hook record holding the overwritten entry bytes.

use shared::routine::RoutineShape;
use std::fmt;

/// Entry address of a compiled routine.
///
/// Opaque to everything but the memory layer; the engine only compares,
/// hashes and offsets it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetAddress(usize);

impl TargetAddress {
    pub const NULL: Self = Self(0);

    pub const fn new(address: usize) -> Self {
        Self(address)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    pub const fn get(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Whether `[self, self + len)` and `[other, other + len)` share a byte.
    pub(crate) fn spans_overlap(self, other: Self, len: usize) -> bool {
        let (lo, hi) = if self.0 <= other.0 { (self.0, other.0) } else { (other.0, self.0) };
        hi - lo < len
    }
}

impl From<usize> for TargetAddress {
    fn from(address: usize) -> Self {
        Self(address)
    }
}

impl fmt::Debug for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TargetAddress({:#x})", self.0)
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// An already-resolved routine: where its code starts and what kind of
/// routine the resolver found there.
///
/// ```rust
/// use hooking_lib::Routine;
///
/// extern "C" fn add(a: i32, b: i32) -> i32 { a + b }
///
/// let r = Routine::plain(add as usize);
/// assert_eq!(r.address().get(), add as usize);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routine {
    address: TargetAddress,
    shape: RoutineShape,
}

impl Routine {
    pub fn new(address: impl Into<TargetAddress>, shape: RoutineShape) -> Self {
        Self { address: address.into(), shape }
    }

    /// A free function or static method.
    pub fn plain(address: impl Into<TargetAddress>) -> Self {
        Self::new(address, RoutineShape::Plain)
    }

    /// An instance-bound method. Its replacement must be a plain routine
    /// taking the receiver as first parameter.
    pub fn method(address: impl Into<TargetAddress>) -> Self {
        Self::new(address, RoutineShape::Method)
    }

    pub fn generic(address: impl Into<TargetAddress>) -> Self {
        Self::new(address, RoutineShape::Generic)
    }

    pub fn generated(address: impl Into<TargetAddress>) -> Self {
        Self::new(address, RoutineShape::Generated)
    }

    pub fn address(&self) -> TargetAddress {
        self.address
    }

    pub fn shape(&self) -> RoutineShape {
        self.shape
    }
}

/// Bookkeeping for one live hook.
///
/// Created when the patch lands and dropped when the saved bytes have been
/// written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookRecord {
    target: TargetAddress,
    replacement: TargetAddress,
    saved: Box<[u8]>,
}

impl HookRecord {
    pub(crate) fn new(target: TargetAddress, replacement: TargetAddress, saved: Vec<u8>) -> Self {
        Self {
            target,
            replacement,
            saved: saved.into_boxed_slice(),
        }
    }

    pub fn target(&self) -> TargetAddress {
        self.target
    }

    /// Where calls to [`Self::target`] currently land.
    pub fn replacement(&self) -> TargetAddress {
        self.replacement
    }

    /// The entry bytes that were at the target before patching.
    pub fn saved_bytes(&self) -> &[u8] {
        &self.saved
    }
}
