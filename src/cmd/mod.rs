//! CLI command implementations.
//!
//! | Module      | Commands handled |
//! |-------------|------------------|
//! | `run`       | `Run`            |
//! | `contracts` | `Contracts`      |
//! | `config`    | `Config`         |

pub mod config;
pub mod contracts;
pub mod run;

pub use config::cmd_config;
pub use contracts::cmd_contracts;
pub use run::{RunArgs, cmd_run};
