/// Level 3 (individual order) orderbook reconstruction for SZSE.
pub mod engine;

pub use engine::{
    decode_l3_message, write_checkpoint_json, ApplyStatus, ChannelCheckpoint,
    DecodePolicy, L3Book, L3Message, L3Order, PriceLevel, ReconstructPolicy,
    SymbolCheckpoint, SzseL3Dispatcher, SzseL3Engine, SzseL3Worker, UnknownOrderPolicy,
};

// Re-export shared types
pub use crate::core::sequencer::GapPolicy;
