pub mod http;

pub use http::ForwardingProxy;
