//! Test support for exercising the SMTP transport against a live socket.

pub mod mock_server;

pub use mock_server::{MockSmtpServer, SmtpCommand};
