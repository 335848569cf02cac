#![cfg_attr(not(test), no_std)]

pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod lora;
pub mod modem;
pub mod protocol;
pub mod satellite;
pub mod selector;
pub mod time;
pub mod transport;

// Embassy tasks need the executor, time driver and HAL
#[cfg(feature = "embedded")]
pub mod tasks;
