//! Format-specific helpers.
//!
//! This module is the home for code that is specific to a particular on-disk
//! segment format. Only Parquet exists today.

pub mod parquet;
