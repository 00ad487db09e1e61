pub mod types;

mod client;

pub use client::{connect, connect_with_config, Client, ClientTx, Connection, ServerRx};
pub use client::config::Config;
