pub mod account;
pub mod command;
pub mod daily;
pub mod signal;

pub use account::*;
pub use command::*;
pub use daily::*;
pub use signal::*;
