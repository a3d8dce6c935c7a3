//! Command implementations

pub mod full;
pub mod incremental;
pub mod restore;
pub mod status;
