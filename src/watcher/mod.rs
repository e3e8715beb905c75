mod prefix_watcher;
pub use prefix_watcher::*;
