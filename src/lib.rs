pub mod config;
pub mod error;
pub mod job;
pub mod params;
pub mod platform;
pub mod query;
pub mod shutdown;

#[cfg(test)]
pub(crate) mod testing;
