pub mod fingerprints;
pub mod shifts;
pub mod sync;
