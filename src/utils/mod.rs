//! Utility Module
//!
//! - [`interner`]: string interning for library function and include names
//!
//! Interned strings ([`Symbol`]s) compare in O(1):
//!
//! ```rust,ignore
//! use myth_rtss::utils::interner;
//!
//! let a = interner::intern("FFP_Transform");
//! let b = interner::intern("FFP_Transform");
//! assert_eq!(a, b);
//! ```

pub mod interner;

pub use interner::Symbol;
