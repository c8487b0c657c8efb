//! Connection settings shared by the SMTP client and the dispatcher.
//!
//! - [`tls`]: how an endpoint connection is secured
//! - [`timeouts`]: per-stage client timeouts

pub mod timeouts;
pub mod tls;

pub use timeouts::ClientTimeouts;
pub use tls::{TlsCertificatePolicy, TransportSecurity};
