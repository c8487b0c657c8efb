pub mod controller;
pub mod recipients;

pub use courier_common::tracing;
