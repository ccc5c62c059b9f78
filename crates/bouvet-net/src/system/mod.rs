//! OS collaborators: filesystem and command execution.

mod cmd;
mod fs;

pub use cmd::{command_line, CmdRunner, ExecResult, OsCmdRunner};
pub use fs::{FileSystem, OsFileSystem};
