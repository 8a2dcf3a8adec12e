//! HTTP request handlers for the session protocol

pub mod connection;
pub mod read;
pub mod status;
