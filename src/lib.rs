//! Library behind `netbackup`, a frontend to simplify periodic backups.
//!
//! A single declarative [`BackupSpec`](config::BackupSpec) drives one
//! backup run: the destination is prepared (optionally decrypted with LUKS
//! and mounted), an external copy program is invoked through one of the
//! [`transports`], hooks run around it and everything acquired on the way is
//! released again, whatever the outcome.
//!
//! The lifecycle lives in [`backup`], process spawning and output capture in
//! [`execute`].

#![forbid(unsafe_code)]

pub mod backup;
pub mod cli;
pub mod config;
pub mod execute;
pub mod prometheus;
pub mod transports;
pub mod util;
