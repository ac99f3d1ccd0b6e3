// Network layer module
// Fix feed client, TCP state listeners and the HTTP state endpoint

pub mod connection;
pub mod messages;
pub mod fix_client;
pub mod output_tcp;
pub mod http;

pub use connection::Connection;
pub use messages::{ClientMessage, FeedMessage, FixReport};
pub use fix_client::TcpFixProvider;
