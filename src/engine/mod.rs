pub mod confidence;
pub mod dedup;
pub mod detectors;
pub mod evolution;
pub mod instinct;
pub mod observation;
pub mod pass;
pub mod portability;
pub mod runstate;
