//! Supervisor API interaction module
//!
//! # Module Structure
//!
//! - [`http`] - Single-attempt HTTP exchange and request types
//! - [`transport`] - Timeout, retry with linear backoff, bearer credential
//! - [`client`] - Typed client, one method per API capability
//! - [`error`] - Failure taxonomy
//!
//! # Example
//!
//! ```ignore
//! use kvmwatch::api::{ResourceClient, RetryPolicy};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = ResourceClient::connect("http://kvm01:5000", RetryPolicy::default())?;
//!     client.login("admin", "admin").await?;
//!     let vms = client.list_vms().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod http;
pub mod transport;

pub use client::ResourceClient;
pub use error::ApiError;
pub use http::{ApiRequest, Exchange, Expect, HttpExchange, Method, RawResponse};
pub use transport::{RetryPolicy, Transport};
