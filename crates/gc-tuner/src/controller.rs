//! Configuration surface: one active [`Tuner`] per controller, and one
//! process-wide controller behind the free functions.

use std::sync::{Arc, LazyLock, Mutex, MutexGuard, OnceLock, PoisonError, TryLockError};

use ctor::ctor;

use crate::backend::RuntimeBackend;
use crate::bounds::SharedBounds;
use crate::finalizer::Driver;
use crate::tuner::Tuner;
use crate::{Result, TunerError};

/// Bounds of this process, loaded from the environment at start-up.
static PROCESS_BOUNDS: LazyLock<Arc<SharedBounds>> =
    LazyLock::new(|| Arc::new(SharedBounds::from_env()));

/// Only one tuner per process.
static GLOBAL_CONTROLLER: OnceLock<Controller> = OnceLock::new();

#[ctor]
unsafe fn load_process_bounds() {
    LazyLock::force(&PROCESS_BOUNDS);
}

/// Owns at most one [`Tuner`] for one runtime.
pub struct Controller {
    runtime: Arc<dyn RuntimeBackend>,
    driver: Driver,
    bounds: Arc<SharedBounds>,
    tuner: Mutex<Option<Tuner>>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("Controller");
        debug.field("driver", &self.driver).field("bounds", &self.bounds);
        // never block: the caller may already hold the lock
        match self.tuner.try_lock() {
            Ok(tuner) => debug.field("tuner", &*tuner),
            Err(TryLockError::Poisoned(poisoned)) => debug.field("tuner", &*poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => debug.field("tuner", &format_args!("<locked>")),
        };
        debug.finish()
    }
}

impl Controller {
    pub fn new(
        runtime: Arc<dyn RuntimeBackend>,
        driver: Driver,
        bounds: Arc<SharedBounds>,
    ) -> Self {
        Self {
            runtime,
            driver,
            bounds,
            tuner: Mutex::new(None),
        }
    }

    /// Enable, reconfigure or disable tuning.
    ///
    /// * `0` releases and clears the active tuner and puts the runtime back on
    ///   the default percent. A tuning pass racing with the release re-applies
    ///   the default after its own write, so the runtime never keeps a tuned
    ///   value once this returns and that pass completes.
    /// * a positive threshold starts a tuner if none is active, otherwise it
    ///   updates the active tuner in place.
    pub fn tuning(&self, threshold: u64) -> Result<()> {
        let mut slot = self.lock_tuner();

        if threshold == 0 {
            if let Some(tuner) = slot.take() {
                let default_percent = self.bounds.default_percent();
                tuner.release(default_percent);
                tracing::info!(default_percent, "GC tuning disabled");
            }
            return Ok(());
        }

        match slot.as_ref() {
            Some(tuner) => {
                tuner.set_threshold(threshold);
                tracing::debug!(threshold, "GC tuning threshold updated");
            }
            None => {
                let tuner = Tuner::new(
                    threshold,
                    Arc::clone(&self.runtime),
                    Arc::clone(&self.bounds),
                    &self.driver,
                )?;
                *slot = Some(tuner);
            }
        }

        Ok(())
    }

    /// Percent applied by the active tuner, or the default when idle.
    pub fn gc_percent(&self) -> u32 {
        match self.lock_tuner().as_ref() {
            Some(tuner) => tuner.gc_percent(),
            None => self.bounds.default_percent(),
        }
    }

    /// Threshold of the active tuner.
    pub fn threshold(&self) -> Option<u64> {
        self.lock_tuner().as_ref().map(Tuner::threshold)
    }

    pub fn is_tuning(&self) -> bool {
        self.lock_tuner().is_some()
    }

    pub fn bounds(&self) -> &SharedBounds {
        &self.bounds
    }

    fn lock_tuner(&self) -> MutexGuard<'_, Option<Tuner>> {
        self.tuner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bind the process-wide controller to `runtime`.
///
/// Fails if a runtime is already bound.
pub fn install(runtime: Arc<dyn RuntimeBackend>, driver: Driver) -> Result<()> {
    let controller = Controller::new(runtime, driver, Arc::clone(&PROCESS_BOUNDS));
    GLOBAL_CONTROLLER
        .set(controller)
        .map_err(|_| error_stack::report!(TunerError::AlreadyInstalled))?;

    tracing::info!(
        default_percent = PROCESS_BOUNDS.default_percent(),
        min_percent = PROCESS_BOUNDS.min_percent(),
        max_percent = PROCESS_BOUNDS.max_percent(),
        "GC tuner installed"
    );
    // the process bounds load before any subscriber exists
    PROCESS_BOUNDS.warn_load_errors();
    Ok(())
}

/// Sets the live-heap threshold respected by the process-wide tuner.
///
/// While tuning, the environment default percent no longer applies.
/// `threshold == 0` disables tuning.
pub fn tuning(threshold: u64) {
    let Some(controller) = GLOBAL_CONTROLLER.get() else {
        tracing::warn!(threshold, "GC tuner not installed, ignoring threshold");
        return;
    };
    if let Err(err) = controller.tuning(threshold) {
        tracing::error!(threshold, "failed to apply GC tuning threshold: {err:?}");
    }
}

pub fn get_gc_percent() -> u32 {
    match GLOBAL_CONTROLLER.get() {
        Some(controller) => controller.gc_percent(),
        None => PROCESS_BOUNDS.default_percent(),
    }
}

pub fn get_default_gc_percent() -> u32 {
    PROCESS_BOUNDS.default_percent()
}

pub fn get_max_gc_percent() -> u32 {
    PROCESS_BOUNDS.max_percent()
}

/// Returns the previous upper bound.
pub fn set_max_gc_percent(n: u32) -> u32 {
    PROCESS_BOUNDS.set_max_percent(n)
}

pub fn get_min_gc_percent() -> u32 {
    PROCESS_BOUNDS.min_percent()
}

/// Returns the previous lower bound.
pub fn set_min_gc_percent(n: u32) -> u32 {
    PROCESS_BOUNDS.set_min_percent(n)
}
