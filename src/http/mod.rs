pub mod client;
pub mod request;

pub use client::{HttpReply, HttpTransport, ReqwestTransport, TransportOptions};
pub use request::{PreparedRequest, DEFAULT_USER_AGENT};

#[cfg(test)]
pub mod testing;
