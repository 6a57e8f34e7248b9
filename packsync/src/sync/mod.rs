pub mod checksum;
pub mod engine;
pub mod fetch;
pub mod loader;
pub mod merge;
pub mod paths;
pub mod planner;
pub mod repository;
pub mod transfer;
