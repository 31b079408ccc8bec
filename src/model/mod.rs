mod catalog;
mod command;
mod device;
mod log_entry;
mod status;

pub use catalog::*;
pub use command::*;
pub use device::*;
pub use log_entry::*;
pub use status::*;
