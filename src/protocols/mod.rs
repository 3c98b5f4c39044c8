//! Protocol implementations.
//!
//! Each protocol is a pair of [`StreamHandler`](crate::runtime::StreamHandler)s
//! driven by the runtime connection loop.
//!
//! - `echo`: bytes written back unchanged, closed by half-close

pub mod echo;
