/// Venue-specific implementations for different exchanges.
///
/// This module contains exchange-specific orderbook reconstruction and
/// data processing logic that doesn't fit into the generic stream module.
///
/// # Structure
/// - `szse/` - Shenzhen Stock Exchange implementations
pub mod szse;
