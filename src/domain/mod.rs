//! Domain types and the ports the application layer talks through.

pub mod assignment;
pub mod dispatch;
pub mod participant;
pub mod ports;
