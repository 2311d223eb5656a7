//! Configuration file handling for `~/.clearsky/config.ini`.
//!
//! Settings structs live in [`settings`], INI key mapping in `parser`,
//! size strings in [`size`]. Values given on the command line override the
//! environment, which overrides the file, which overrides the defaults.

mod file;
mod parser;
mod settings;
mod size;

pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    CacheSettings, ConfigFile, DispatchSettings, LoggingSettings, QueueSettings,
    StorageSettings, WorkerSettings, DEFAULT_EXTENT, DEFAULT_LISTEN, DEFAULT_LOG_FILE,
    DEFAULT_SUBSCRIPTION, DEFAULT_TILE_SIZE,
};
pub use size::{format_size, parse_size, Size, SizeParseError};
