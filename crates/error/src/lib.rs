//! Kernel error handling infrastructure.
//!
//! Provides the `define_kernel_error!` macro so every subsystem reports
//! failures the same way: a `Copy` enum with a numeric code, a short
//! description, and a flag telling the boot sequencer whether the failure
//! leaves it any option other than a diagnostic halt.
//!
//! ## Usage
//!
//! ### Simple errors (no inner data)
//! ```ignore
//! define_kernel_error! {
//!     pub enum FrameError(0x02) {
//!         OutOfMemory = 0x01 => "No free frame run of the requested length",
//!         DoubleFree = 0x02 => "Release of a frame that is already free",
//!     }
//! }
//! ```
//!
//! ### Boot-fatal errors
//! A trailing `[fatal]` marks a variant that the boot sequence cannot
//! recover from:
//! ```ignore
//! define_kernel_error! {
//!     pub enum MmuError(0x01) {
//!         ArenaExhausted = 0x02 => "Translation table arena exhausted" [fatal],
//!     }
//! }
//! ```
//!
//! ### Nested errors (with inner error type)
//! Nested variants delegate `is_boot_fatal` to the inner error unless they
//! carry their own marker.
//! ```ignore
//! define_kernel_error! {
//!     pub enum BootError(0x03) {
//!         RamMapping(MmuError) = 0x01 => "Mapping RAM failed",
//!         Activation(MmuError) = 0x03 => "Enabling translation failed",
//!     }
//! }
//! ```

#![no_std]

/// Macro to define a kernel error type with consistent handling.
///
/// Supports both simple variants and nested variants containing inner errors.
/// Inner error types must themselves be defined with this macro.
#[macro_export]
macro_rules! define_kernel_error {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident($subsystem:literal) {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $(($inner:ty))? = $code:literal => $desc:literal $([$marker:ident])?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant $(($inner))?,
            )*
        }

        impl $name {
            /// Subsystem identifier for this error type.
            pub const SUBSYSTEM: u8 = $subsystem;

            /// Get numeric error code for debugging.
            pub const fn code(&self) -> u16 {
                match self {
                    $(
                        $crate::define_kernel_error!(@pattern $variant $(($inner))? _unused) => {
                            (($subsystem as u16) << 8) | $code
                        }
                    )*
                }
            }

            /// Get error name for logging.
            pub const fn name(&self) -> &'static str {
                match self {
                    $(
                        $crate::define_kernel_error!(@pattern $variant $(($inner))? _unused) => {
                            $desc
                        }
                    )*
                }
            }

            /// Whether this failure must halt the boot sequence.
            pub const fn is_boot_fatal(&self) -> bool {
                match self {
                    $(
                        $crate::define_kernel_error!(@pattern $variant $(($inner))? inner) => {
                            $crate::define_kernel_error!(@fatal_body $(($inner))? inner $($marker)?)
                        }
                    )*
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match self {
                    $(
                        $crate::define_kernel_error!(@pattern $variant $(($inner))? inner) => {
                            $crate::define_kernel_error!(@display_body self f $desc $(($inner))? inner)
                        }
                    )*
                }
            }
        }

        impl core::error::Error for $name {}
    };

    // Helper to generate patterns
    (@pattern $variant:ident ($inner:ty) $bind:ident) => { Self::$variant($bind) };
    (@pattern $variant:ident $bind:ident) => { Self::$variant };

    // Helper to generate display bodies
    (@display_body $self:ident $f:ident $desc:literal ($inner:ty) $bind:ident) => {
        write!($f, "E{:04X}: {} ({})", $self.code(), $desc, $bind)
    };
    (@display_body $self:ident $f:ident $desc:literal $bind:ident) => {
        write!($f, "E{:04X}: {}", $self.code(), $desc)
    };

    // Helper to generate boot-fatal classification
    (@fatal_body ($inner:ty) $bind:ident fatal) => {{
        let _ = $bind;
        true
    }};
    (@fatal_body ($inner:ty) $bind:ident) => { $bind.is_boot_fatal() };
    (@fatal_body $bind:ident fatal) => { true };
    (@fatal_body $bind:ident) => { false };
}

#[cfg(test)]
mod tests {

    define_kernel_error! {
        /// Test error type
        pub enum TestError(0xFF) {
            /// Recoverable
            First = 0x01 => "First error",
            /// Halts boot
            Second = 0x02 => "Second error" [fatal],
        }
    }

    define_kernel_error! {
        pub enum NestedTestError(0xFE) {
            Inner(TestError) = 0x01 => "Nested error",
            Forced(TestError) = 0x02 => "Forced fatal" [fatal],
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(TestError::First.code(), 0xFF01);
        assert_eq!(TestError::Second.code(), 0xFF02);
        assert_eq!(NestedTestError::Inner(TestError::First).code(), 0xFE01);
        assert_eq!(NestedTestError::Forced(TestError::First).code(), 0xFE02);
    }

    #[test]
    fn test_error_names() {
        assert_eq!(TestError::First.name(), "First error");
        assert_eq!(TestError::Second.name(), "Second error");
        assert_eq!(
            NestedTestError::Inner(TestError::First).name(),
            "Nested error"
        );
    }

    #[test]
    fn test_display_format() {
        extern crate std;
        use std::format;
        assert_eq!(format!("{}", TestError::Second), "EFF02: Second error");

        let inner = TestError::First;
        assert_eq!(
            format!("{}", NestedTestError::Inner(inner)),
            "EFE01: Nested error (EFF01: First error)"
        );
    }

    #[test]
    fn test_boot_fatal_marker() {
        assert!(!TestError::First.is_boot_fatal());
        assert!(TestError::Second.is_boot_fatal());
    }

    #[test]
    fn test_boot_fatal_nested_delegates_to_inner() {
        assert!(!NestedTestError::Inner(TestError::First).is_boot_fatal());
        assert!(NestedTestError::Inner(TestError::Second).is_boot_fatal());
        // Own marker wins over the inner classification
        assert!(NestedTestError::Forced(TestError::First).is_boot_fatal());
    }

    #[test]
    fn test_subsystem_constant() {
        assert_eq!(TestError::SUBSYSTEM, 0xFF);
        assert_eq!(NestedTestError::SUBSYSTEM, 0xFE);
    }
}
