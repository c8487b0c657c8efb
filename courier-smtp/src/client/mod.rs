//! SMTP submission client.
//!
//! Supports plain TCP, STARTTLS and implicit TLS connections, `AUTH PLAIN` and
//! `AUTH LOGIN`, and building simple `text/plain` messages.
//!
//! ```no_run
//! use courier_smtp::client::{MessageBuilder, SmtpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("smtp.example.com:587", "smtp.example.com".to_string()).await?;
//! client.read_greeting().await?;
//! client.ehlo("client.example.com").await?;
//! client.starttls().await?;
//! let capabilities = client.ehlo("client.example.com").await?;
//! client.authenticate("user", "secret", &capabilities).await?;
//!
//! let message = MessageBuilder::new()
//!     .from("user@example.com")
//!     .to("someone@example.org")
//!     .subject("Hello")
//!     .body("Hello World")
//!     .build()?;
//!
//! client.mail_from("user@example.com", None).await?;
//! client.rcpt_to("someone@example.org").await?;
//! client.data().await?;
//! client.send_data(&message).await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod message;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use message::MessageBuilder;
pub use response::{Response, ResponseLine};
pub use smtp_client::{AuthMechanism, SmtpClient};
