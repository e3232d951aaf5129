mod reader;
mod resolver;

pub use reader::StorageReader;
pub use resolver::{ResolvedStorage, StorageResolver, StorageTier};
