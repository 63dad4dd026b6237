use crate::config::{find_config_file, Config, ScenarioConfig};
use crate::target::{add_hook, larger_of, Calculator};
use hooking_lib::{HookError, HookManager, Routine};
use log::{error, info, warn};
use std::hint::black_box;

mod config;
mod logger;
mod target;

type AddFn = extern "C" fn(&Calculator, i32, i32) -> i32;

/// Replays the classic demonstration: `add(1, 1)` is 2, then 3 while
/// `Calculator::add` is redirected to `add_hook`, then 2 again.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = find_config_file();
    let cfg = Config::load_or_default(&config_path)?;

    // Keep logger alive for the duration of the process.
    let _logger = logger::init_logger(&cfg.logging)?;
    info!("Configuration resolved from {}", config_path.display());

    match run(&cfg.scenario) {
        Ok(()) => Ok(()),
        Err(e) if e.is_environmental() => {
            // The host cannot patch code right now; nothing the caller did wrong.
            error!("Unrecoverable platform error: {e}");
            Err(e.into())
        }
        Err(e) => {
            error!("Unable to hook method: {e}");
            Err(e.into())
        }
    }
}

fn run(scenario: &ScenarioConfig) -> Result<(), HookError> {
    let ScenarioConfig { a, b } = *scenario;
    let mut manager = HookManager::new()?;
    info!(
        "Hook manager on {} patches {} bytes per hook",
        manager.architecture(),
        manager.patch_len()
    );

    let add: AddFn = Calculator::add;
    let replacement: AddFn = add_hook;
    let calc = Calculator { id: 1 };

    info!("{a} + {b} = {}", black_box(&calc).add(a, b));

    unsafe { manager.hook(Routine::method(add as usize), Routine::plain(replacement as usize))? };
    info!(
        "{a} + {b} = {}? The laws of math are breaking down!",
        black_box(&calc).add(a, b)
    );

    unsafe { manager.unhook(add as usize)? };
    info!("{a} + {b} = {}", black_box(&calc).add(a, b));

    let generic: fn(i32, i32) -> i32 = larger_of::<i32>;
    match unsafe { manager.hook(Routine::generic(generic as usize), Routine::plain(replacement as usize)) } {
        Err(HookError::InvalidArgument(reason)) => info!("Refused as expected: {reason}"),
        Err(e) => return Err(e),
        Ok(()) => {
            warn!("Generic routine was hooked; restoring it");
            unsafe { manager.unhook(generic as usize)? };
        }
    }
    info!("larger_of({a}, {b}) = {}", black_box(generic)(a, b));

    Ok(())
}
