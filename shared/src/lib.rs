//! Courier shared library: data models, errors, HTTP wire helpers and the
//! streaming response reader used by the downloader.

pub mod errors;
pub mod http_protocol;
pub mod models;
pub mod response_reader;
pub mod run_summary;
