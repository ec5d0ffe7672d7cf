pub mod cli;
pub mod config;
pub mod drivers;
pub mod gpio;
pub mod input;
