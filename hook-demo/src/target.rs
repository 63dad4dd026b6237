//! The routines the demo hooks.

use log::info;
use std::hint::black_box;

/// Hooking is retroactive: instances created before the hook see it too.
#[repr(C)]
#[derive(Debug)]
pub struct Calculator {
    pub id: u32,
}

impl Calculator {
    #[inline(never)]
    pub extern "C" fn add(&self, a: i32, b: i32) -> i32 {
        let a = black_box(a);
        let b = black_box(b);
        black_box(a.wrapping_add(b))
    }
}

/// Replacement for [`Calculator::add`]. The receiver comes first, as an
/// ordinary parameter. There is no way back into the original, so the sum is
/// recomputed here.
#[inline(never)]
pub extern "C" fn add_hook(this: &Calculator, a: i32, b: i32) -> i32 {
    info!("Hook called on calculator #{}", this.id);
    black_box(a.wrapping_add(b).wrapping_add(1))
}

/// Generic routines have no single entry point to patch.
#[inline(never)]
pub fn larger_of<T: PartialOrd>(a: T, b: T) -> T {
    if a > b { a } else { b }
}
