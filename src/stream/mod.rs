pub mod binary_reader;
pub mod binary_writer;
pub mod xml_reader;
pub mod xml_writer;

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z, the epoch of plist dates.
pub(crate) const APPLE_EPOCH_OFFSET: i64 = 978_307_200;
