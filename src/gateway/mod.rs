pub mod pipeline;
pub mod server;

pub use pipeline::GatewayPipeline;
pub use server::GatewayServer;
