mod connection;
mod controller;
mod error;
mod limits;
mod protocol;
#[cfg(test)]
pub mod sim;

pub use connection::{MountConnection, MountLink, Transport};
pub use controller::{MountController, MountPosition};
pub use error::MountError;
pub use limits::PointingLimits;
pub use protocol::MountCommands;
