//! rollavg computes per-entity rolling averages over tumbling processing-time windows
//! for CSV records appended to files in a watched directory.
pub mod codec;
pub mod config;
pub mod keyed;
pub mod runtime;
pub mod sinks;
pub mod sources;
pub mod testing;
pub mod types;
pub mod window;
