mod extractor;
mod feature;
mod features;
mod catalog;
mod refinery;
mod sink;
mod triggers;

pub use extractor::{Extractor, ExtractorStats};
pub use catalog::{SymbolCatalog, SymbolIdentity};
pub use feature::{
    AlwaysEmit, ColumnSpec, Feature, FeatureGraph, FeatureSet, RowBuffer, RowWriter, Trigger,
};
pub use features::{BookImbalance, GlobalTime, MidPrice, SpreadBps};
pub use refinery::Refinery;
pub use sink::{ParquetSink, RowSink};
pub use triggers::{AnyTrigger, EventTypeTrigger, TimeBarTrigger, Timebase};

pub use chronicle_replay::{BookEvent, BookEventPayload, LevelsView, ReplayEngine, ReplayMessage};
pub use chronicle_replay::{GapPolicy, ReplayPolicy};
