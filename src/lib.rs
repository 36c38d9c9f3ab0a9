pub mod agents;
pub mod appforge_config;
pub mod artifact;
pub mod config;
pub mod contract;
pub mod errors;
pub mod gates;
pub mod logging;
pub mod pipeline;
pub mod repair;
pub mod verification;
