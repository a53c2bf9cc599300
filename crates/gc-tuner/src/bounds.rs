//! GC percent bounds shared by every calculation in the process.

use std::sync::atomic::{AtomicU32, Ordering};

use error_stack::Report;

use crate::{Result, TunerError};

/// Built-in lower bound.
pub const MIN_GC_PERCENT: u32 = 50;
/// Built-in upper bound.
pub const MAX_GC_PERCENT: u32 = 500;
/// Built-in default, used when no tuner is active or the inputs are degenerate.
pub const DEFAULT_GC_PERCENT: u32 = 100;

/// Environment variable overriding the default percent.
pub const DEFAULT_PERCENT_ENV: &str = "GC_TUNER_PERCENT";
/// Environment variable overriding the lower bound.
pub const MIN_PERCENT_ENV: &str = "GC_TUNER_MIN_PERCENT";
/// Environment variable overriding the upper bound.
pub const MAX_PERCENT_ENV: &str = "GC_TUNER_MAX_PERCENT";

/// Point-in-time copy of the bounds.
///
/// The intended policy is `0 < min_percent <= default_percent <= max_percent`,
/// but it is not enforced; callers changing one bound are responsible for the
/// others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min_percent: u32,
    pub max_percent: u32,
    pub default_percent: u32,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min_percent: MIN_GC_PERCENT,
            max_percent: MAX_GC_PERCENT,
            default_percent: DEFAULT_GC_PERCENT,
        }
    }
}

impl Bounds {
    pub fn new(min_percent: u32, max_percent: u32, default_percent: u32) -> Self {
        Self {
            min_percent,
            max_percent,
            default_percent,
        }
    }

    /// Whether the bounds follow `0 < min <= default <= max`.
    pub fn is_consistent(&self) -> bool {
        0 < self.min_percent
            && self.min_percent <= self.default_percent
            && self.default_percent <= self.max_percent
    }
}

/// Bounds readable and writable from any thread.
///
/// Each field is its own atomic, so a reader racing with a writer may see
/// a mix of old and new values across fields.
#[derive(Debug)]
pub struct SharedBounds {
    min_percent: AtomicU32,
    max_percent: AtomicU32,
    default_percent: AtomicU32,
    /// Problems found while loading, kept until a subscriber can see them.
    load_errors: Vec<Report<TunerError>>,
}

impl Default for SharedBounds {
    fn default() -> Self {
        Self::new(Bounds::default())
    }
}

impl SharedBounds {
    pub const fn new(bounds: Bounds) -> Self {
        Self {
            min_percent: AtomicU32::new(bounds.min_percent),
            max_percent: AtomicU32::new(bounds.max_percent),
            default_percent: AtomicU32::new(bounds.default_percent),
            load_errors: Vec::new(),
        }
    }

    /// Load bounds from the process environment, falling back to the
    /// built-in values for anything absent or malformed.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load bounds through `lookup`, which maps a variable name to its value.
    ///
    /// Nothing is logged here: the process bounds load before `main`, when no
    /// subscriber exists yet. Rejected values are kept and reported by
    /// [`SharedBounds::warn_load_errors`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Bounds::default();
        let mut load_errors = Vec::new();
        let bounds = Bounds {
            min_percent: percent_or(
                &lookup,
                MIN_PERCENT_ENV,
                defaults.min_percent,
                &mut load_errors,
            ),
            max_percent: percent_or(
                &lookup,
                MAX_PERCENT_ENV,
                defaults.max_percent,
                &mut load_errors,
            ),
            default_percent: percent_or(
                &lookup,
                DEFAULT_PERCENT_ENV,
                defaults.default_percent,
                &mut load_errors,
            ),
        };

        if !bounds.is_consistent() {
            load_errors.push(
                Report::new(TunerError::invalid_config(
                    "GC percent bounds are inconsistent, calculations still clamp min first",
                ))
                .attach_printable(format!("{bounds:?}")),
            );
        }

        Self {
            load_errors,
            ..Self::new(bounds)
        }
    }

    /// Values rejected or inconsistent at load time.
    pub fn load_errors(&self) -> &[Report<TunerError>] {
        &self.load_errors
    }

    /// Emit one `warn!` per load error. Returns how many were reported.
    pub fn warn_load_errors(&self) -> usize {
        for err in &self.load_errors {
            tracing::warn!("GC percent bounds from environment: {err:?}");
        }
        self.load_errors.len()
    }

    pub fn snapshot(&self) -> Bounds {
        Bounds {
            min_percent: self.min_percent(),
            max_percent: self.max_percent(),
            default_percent: self.default_percent(),
        }
    }

    pub fn min_percent(&self) -> u32 {
        self.min_percent.load(Ordering::Acquire)
    }

    /// Returns the previous lower bound.
    pub fn set_min_percent(&self, percent: u32) -> u32 {
        self.min_percent.swap(percent, Ordering::AcqRel)
    }

    pub fn max_percent(&self) -> u32 {
        self.max_percent.load(Ordering::Acquire)
    }

    /// Returns the previous upper bound.
    pub fn set_max_percent(&self, percent: u32) -> u32 {
        self.max_percent.swap(percent, Ordering::AcqRel)
    }

    pub fn default_percent(&self) -> u32 {
        self.default_percent.load(Ordering::Acquire)
    }

    /// Returns the previous default.
    pub fn set_default_percent(&self, percent: u32) -> u32 {
        self.default_percent.swap(percent, Ordering::AcqRel)
    }
}

fn percent_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    fallback: u32,
    load_errors: &mut Vec<Report<TunerError>>,
) -> u32 {
    let Some(raw) = lookup(key) else {
        return fallback;
    };

    match parse_percent(key, &raw) {
        Ok(percent) => percent,
        Err(err) => {
            load_errors.push(err.attach_printable(format!("falling back to {fallback}")));
            fallback
        }
    }
}

/// Parse a percent as a plain decimal `u32`.
pub(crate) fn parse_percent(key: &str, raw: &str) -> Result<u32> {
    raw.trim().parse::<u32>().map_err(|err| {
        error_stack::report!(TunerError::invalid_percent(key, raw)).attach_printable(err)
    })
}
