//! Small shared utilities

pub mod nick;
pub mod rate_limit;
