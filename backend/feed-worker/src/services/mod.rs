pub mod fanout;

pub use fanout::{FanOutHandler, FanOutSettings};
