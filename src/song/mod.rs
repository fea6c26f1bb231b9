//! Song position tracking: timing metadata and the dead-reckoned position
//! estimate derived from server reports.

mod position;
mod timing;

pub use position::{
    PositionEstimator, PositionReport, PositionTracker, POSITION_HISTORY_CAPACITY,
    STALE_POSITION_TIMEOUT_MILLIS,
};
pub use timing::SongTiming;
