//! Line-based bridge between a controller and a runtime hosting agents.

pub mod codec;
pub mod command;
pub mod controller;
pub mod receiver;
pub mod runtime;
pub mod writer;

pub use codec::{LineCodec, MAX_LINE_LENGTH};
pub use command::{is_valid_id, Command, DeltaKind, StepKind};
pub use controller::{ControllerBridge, ProcessSpawner, ProxySpawner};
pub use receiver::{PendingReplies, ReplyKind, ReplyReceiver};
pub use runtime::RuntimeBridge;
pub use writer::CommandWriter;
