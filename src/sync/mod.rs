pub mod job;

pub use job::SyncJob;
