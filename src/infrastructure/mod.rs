//! Adapters implementing the domain ports.

pub mod in_memory;
pub mod json_file;
pub mod smtp;
pub mod templates;
pub mod transport;
