//! Profiling support via Tracy.
//!
//! Barrier flushes, context closes and queue submissions are instrumented with
//! the macros in this module. Profiling is enabled via the `profiling` Cargo
//! feature:
//!
//! ```bash
//! cargo test -p redlilium-command --features profiling
//! ```
//!
//! When profiling is disabled (the default), all macros compile to no-ops.
//!
//! ```ignore
//! use redlilium_command::profiling::{profile_function, profile_plot, profile_scope};
//!
//! fn submit() {
//!     profile_function!();
//!     {
//!         profile_scope!("resolve_pending");
//!     }
//!     profile_plot!("Corrective barriers", 3);
//! }
//! ```

#[cfg(feature = "profiling")]
pub use tracy_client::{self, Client, plot as tracy_plot, span};

/// Profile the enclosing scope under a static name.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Profile the enclosing function.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _profile_span = $crate::profiling::span!();
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

/// Plot a numeric value.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        $crate::profiling::tracy_plot!($name, $value as f64)
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        let _ = $value;
    };
}

pub use profile_function;
pub use profile_plot;
pub use profile_scope;

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_compile() {
        profile_scope!("test_scope");
        profile_function!();
        profile_plot!("test_value", 42);
    }
}
