//! Small helpers without a better home.

pub mod logfile;
pub mod mounts;
