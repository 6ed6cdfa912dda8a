pub mod archive;
pub mod config;
pub mod delivery;
pub mod fetch;
pub mod github;
pub mod pipeline;
pub mod query;
pub mod subscription;
