/// Command recording

pub mod command_recorder;
pub mod copy_command;

pub use command_recorder::{CommandRecorder, RecorderState};
pub use copy_command::CopyCommand;
