//! Index types.

pub use index_vec::{Idx, IndexSlice, IndexVec, define_index_type, index_vec};

/// Defines a `u32`-backed index newtype usable as an [`IndexVec`] key.
///
/// Indices display as their raw value so they can be embedded in IR names (`%3`, `r2`).
#[macro_export]
macro_rules! newtype_index {
    ($(#[$attr:meta])* $vis:vis struct $name:ident;) => {
        $crate::index::define_index_type! {
            $(#[$attr])*
            $vis struct $name = u32;
            DISPLAY_FORMAT = "{}";
        }
    };
}
