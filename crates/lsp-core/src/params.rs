use crate::error::LspError;

/// Connection parameters. All three fields must be strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    /// Epoch tick period, in milliseconds.
    pub epoch_millis: u64,
    /// Number of consecutive silent ticks tolerated before declaring loss.
    pub epoch_limit: u32,
    /// Sliding window size, `W`, in both directions.
    pub window_size: u32,
}

impl Params {
    pub fn new(epoch_millis: u64, epoch_limit: u32, window_size: u32) -> Result<Self, LspError> {
        if epoch_millis == 0 {
            return Err(LspError::InvalidParams("epoch_millis must be positive"));
        }
        if epoch_limit == 0 {
            return Err(LspError::InvalidParams("epoch_limit must be positive"));
        }
        if window_size == 0 {
            return Err(LspError::InvalidParams("window_size must be positive"));
        }
        Ok(Params {
            epoch_millis,
            epoch_limit,
            window_size,
        })
    }
}
