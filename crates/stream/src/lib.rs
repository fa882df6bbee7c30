//! Streaming response handling for the Windlass runtime.
//!
//! [`StreamAggregator`] folds a finite sequence of partial responses into a
//! single merged response with accurate token accounting, emitting periodic
//! progress so operators can tell a slow model from a hung one.
//! [`TraceRecorder`] captures one request/response cycle per turn to a
//! dedicated log target.

pub mod aggregator;
pub mod progress;
pub mod trace;

pub use aggregator::{StreamAggregator, StreamOptions};
pub use progress::{ProgressSink, StreamCompletion, StreamProgress, TracingProgressSink};
pub use trace::TraceRecorder;
