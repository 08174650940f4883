//! User-facing commands, implemented as methods on [`crate::App`].

mod sync;
