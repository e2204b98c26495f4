pub mod collect;
pub mod merge;
pub mod stats;
