//! Built-in tools
//!
//! - `BashTool` (`bash_execute`) - Run a shell command
//! - `FsReadTool` (`fs_read`) - Read a file
//! - `FsWriteTool` (`fs_write`) - Write or append to a file
//! - `FsPatchTool` (`fs_patch`) - Replace text in a file and return a diff

pub mod bash;
pub mod fs;

pub use bash::BashTool;
pub use fs::{FsPatchTool, FsReadTool, FsWriteTool, WorkDirs};
