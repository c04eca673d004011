//! Common data structures shared by the smempack crates.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bit_set;
pub mod index;
pub mod map;

pub use smallvec;
