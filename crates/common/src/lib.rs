//! Ambient services shared by the auction backend binaries.

pub mod logging;
