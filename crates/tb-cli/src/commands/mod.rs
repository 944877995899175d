//! CLI command implementations

mod config;
mod listen;
mod ping;
mod send;

pub use config::{config_init, config_path, config_show};
pub use listen::listen_command;
pub use ping::ping_command;
pub use send::send_command;
