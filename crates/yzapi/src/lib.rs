pub mod client;
pub mod http;
pub mod retry;

pub use client::{ClientFactory, EntityClient};
pub use http::{ApiSettings, HttpClient, HttpClientFactory, RequestError, DEFAULT_BASE_URL};
pub use retry::RetryPolicy;
