//! Platform-specific helpers.
//! This module hides OS differences (Unix/Windows) behind a uniform API so
//! the rest of the codebase can remain platform-agnostic.

#[cfg(unix)]
mod common_unix;
mod temp;
#[cfg(unix)]
mod unix;
#[cfg(not(unix))]
mod windows;

#[cfg(unix)]
pub use unix::{
    is_cross_device, is_writable, mode_of, open_log_file_secure_append, read_mode,
    set_dir_mode_0700, set_file_mode_0600, write_config_secure_new_0600, write_mode,
};

#[cfg(not(unix))]
pub use windows::{
    is_cross_device, is_writable, mode_of, open_log_file_secure_append, read_mode,
    set_dir_mode_0700, set_file_mode_0600, write_config_secure_new_0600, write_mode,
};
