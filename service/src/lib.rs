//! Ambient infrastructure shared by the token whitelist: command line / environment
//! configuration and console logging.

pub mod config;
pub mod logging;
