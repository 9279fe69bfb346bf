//! Background loops.

pub mod grant_loop;

pub use grant_loop::run_grant_loop;
