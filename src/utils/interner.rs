//! Global String Interner
//!
//! Library function names and include-file names are repeated across every
//! generated program. They are interned once and carried through the IR as
//! [`Symbol`]s, so atoms and dependency lists stay `Copy`-cheap and compare as
//! integers.

use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// Compact integer identifier of an interned string.
pub type Symbol = Spur;

/// Interns a string, returning its [`Symbol`].
///
/// Returns the existing symbol if the string was interned before.
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Returns the symbol of an already interned string without allocating.
#[inline]
#[must_use]
pub fn get(s: &str) -> Option<Symbol> {
    INTERNER.get(s)
}

/// Resolves a symbol back to its string.
#[inline]
#[must_use]
pub fn resolve(sym: Symbol) -> &'static str {
    INTERNER.resolve(&sym)
}

/// Pre-interns the names of the built-in shader libraries and their entry
/// points so the first generation pass does not pay for it.
pub fn preload_library_names() {
    let common = [
        "FFPLib_Common",
        "FFPLib_Transform",
        "FFPLib_Lighting",
        "FFPLib_Texturing",
        "FFPLib_Fog",
        "FFPLib_AlphaTest",
        "SGXLib_PerPixelLighting",
        "SGXLib_NormalMap",
        "SGXLib_CookTorrance",
        "SGXLib_DualQuaternion",
        "SGXLib_WBOIT",
        "FFP_Transform",
        "FFP_TransformNormal",
        "FFP_Alpha_Test",
        "PBR_Light",
        "SGX_WBOIT",
    ];

    for name in common {
        intern(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_and_resolve() {
        let s1 = intern("FFP_Transform");
        let s2 = intern("FFP_Transform");
        let s3 = intern("FFP_Alpha_Test");

        assert_eq!(s1, s2);
        assert_ne!(s1, s3);

        assert_eq!(resolve(s1), "FFP_Transform");
        assert_eq!(resolve(s3), "FFP_Alpha_Test");
    }

    #[test]
    fn test_get() {
        let _ = intern("SGX_Existing");

        assert!(get("SGX_Existing").is_some());
        assert!(get("SGX_NonExisting").is_none());
    }
}
