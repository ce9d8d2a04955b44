//! neuroscan_wrap
//!
//! Command line front end of the segmentation pipeline.
#![deny(missing_docs)]

/// Argument types shared by the subcommands
pub mod utils;
