pub mod accel;
pub mod api;
pub mod artifact;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod partition;
pub mod publish;
pub mod registry;
pub mod shutdown;
pub mod staging;
pub mod worker;
