pub mod batch;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod lock;
pub mod process;
pub mod resolve;
pub mod run;
pub mod secrets;
pub mod seen;
pub mod session;
pub mod train;
pub mod unwrap;
pub mod util;
