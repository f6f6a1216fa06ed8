//! Domain models shared across the bridge

mod command;
mod group;
mod path;
mod result;
mod value;

pub use command::{CommissioningWindow, PairingMethod, StackCommand};
pub use group::{GroupAction, GroupId, GroupInfo, MAX_GROUP_NAME_LEN};
pub use path::{ItemPath, NodeId, PathSet, MAX_PATHS};
pub use result::{status, ResultItem};
pub use value::Value;
