//! Winemason Library
//!
//! Core library for provisioning per-user Wine prefixes on a Linux host.
//! Covers prefix identity, registry access through wine's own tools,
//! PATH-list merging and the per-user download cache.

pub mod cache;
pub mod download;
pub mod error;
pub mod machine;
pub mod prefix;
pub mod registry;
pub mod shell;
pub mod users;

pub use cache::WineCache;
pub use download::{Downloader, HttpDownloader};
pub use error::{Result, WinemasonError};
pub use machine::{Machine, WindowsVersion};
pub use prefix::{WineArch, WinePrefix};
pub use registry::{RegValueType, RegWriteType, Registry};
pub use shell::{CommandOutput, RunOptions, ShellRunner, SystemShell};
pub use users::{current_username, SystemUsers, UserLookup};
