pub mod catalog;
pub mod guide_cache;
pub mod job_runner;
pub mod metrics;
pub mod redis;
pub mod registry;
pub mod run_lock;
pub mod run_state;
pub mod scheduler;
pub mod xtream;

#[cfg(test)]
pub mod testing;
