pub mod classify;
pub mod config_cmd;
pub mod plan;
pub mod run;
