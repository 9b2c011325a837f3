use crate::error::SampleError;
use crate::storage::{DataSet, Payload};

/// Trait for the acquisition side that produces one raw data set on demand.
///
/// The returned payload uses the on-media layout; its time fields are ignored
/// by the averaging stage and overwritten when the average is saved.
pub trait SampleSource {
    fn read_sample(&mut self) -> Result<Payload, SampleError>;
}

impl<F> SampleSource for F
where
    F: FnMut() -> Result<DataSet, SampleError>,
{
    fn read_sample(&mut self) -> Result<Payload, SampleError> {
        self().map(|set| set.to_payload())
    }
}
