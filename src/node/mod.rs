mod agent;
mod builder;
pub use agent::*;
pub use builder::*;
