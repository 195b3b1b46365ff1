//! Macro for mapping enums onto their remote wire names
//!
//! The remote API names verbs and option values in camelCase
//! (`addOrUpdate`, `trackingType`). This macro generates `as_str`,
//! `Display` and a case-insensitive `FromStr` from one table.
//!
//! # Example
//!
//! ```rust
//! use mailwire_domain::impl_wire_name_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Verb {
//!     Add,
//!     AddOrUpdate,
//! }
//!
//! impl_wire_name_conversions!(Verb {
//!     Add => "add",
//!     AddOrUpdate => "addOrUpdate",
//! });
//!
//! assert_eq!(Verb::AddOrUpdate.to_string(), "addOrUpdate");
//! assert_eq!("ADDORUPDATE".parse::<Verb>(), Ok(Verb::AddOrUpdate));
//! ```

/// Implements `as_str`, `Display` and `FromStr` for wire-named enums
///
/// Parsing ignores ASCII case; output always uses the wire spelling.
#[macro_export]
macro_rules! impl_wire_name_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Wire name used by the remote API
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($str) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(format!("Invalid {}: {}", stringify!($enum_name), s))
            }
        }
    };
}
