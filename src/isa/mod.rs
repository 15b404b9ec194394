pub mod defs;
pub mod types;
