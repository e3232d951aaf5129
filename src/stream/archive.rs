//! Archive stream reader.
//!
//! **TODO**: This module needs to be migrated to use `table::TableReader` instead
//! of the removed `storage::StorageReader`. The new TableReader provides similar
//! functionality with partition-based queries and timestamp-ordered reads.

// COMMENTED OUT - Pending migration to table::TableReader
// The old storage module has been removed in favor of the unified table system.
//
// use std::path::Path;
// use std::time::Duration;
//
// use crate::core::WaitStrategy;
// use anyhow::Result;
//
// use super::{OwnedStreamReader, StreamMessageOwned, StreamMessageRef, StreamReader};
//
// pub struct ArchiveStream {
//     reader: /* TableReader or similar */,
// }
//
// impl ArchiveStream {
//     pub fn open(
//         venue: &str,
//         symbol_code: &str,
//         date: &str,
//         stream: &str,
//     ) -> Result<Self> {
//         // TODO: Use TableReader with partition query
//         unimplemented!("Migrate to TableReader")
//     }
//
//     pub fn open_segment(path: impl AsRef<Path>) -> Result<Self> {
//         // TODO: Use TableReader or direct segment reader
//         unimplemented!("Migrate to TableReader")
//     }
// }
//
// impl StreamReader for ArchiveStream {
//     fn next<'a>(&'a mut self) -> Result<Option<StreamMessageRef<'a>>> {
//         unimplemented!("Migrate to TableReader")
//     }
//
//     fn wait(&mut self, _timeout: Option<Duration>) -> Result<()> {
//         Ok(())
//     }
//
//     fn commit(&mut self) -> Result<()> {
//         Ok(())
//     }
//
//     fn set_wait_strategy(&mut self, _strategy: WaitStrategy) {}
//
//     fn seek_timestamp(&mut self, target_ts_ns: u64) -> Result<bool> {
//         unimplemented!("Migrate to TableReader")
//     }
// }
