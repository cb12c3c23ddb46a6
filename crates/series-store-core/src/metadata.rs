//! Metadata layer.
//!
//! Pure data types recorded in the transaction log and library marker. Nothing
//! in here performs IO; readers and writers of these types live under
//! `transaction_log` and `store`.

pub mod library;
pub mod segments;
pub mod series_meta;
pub mod write_mode;
