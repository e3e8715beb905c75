mod config;
mod constants;
mod coordination;
mod dispatch;
mod errors;
mod node;
mod registration;
mod watcher;

pub use config::*;
pub use coordination::*;
pub use dispatch::*;
pub use errors::*;
pub use node::*;
pub use registration::*;
pub use watcher::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
