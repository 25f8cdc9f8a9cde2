pub mod cache;
pub mod error;
pub mod storage;
pub mod timing;

// Re-export commonly used types
pub use cache::{Clock, ManualClock, SystemClock, TtlCache};
pub use error::{FlowError, Result};
pub use storage::{InMemorySessionStorage, Session, SessionStorage};
pub use timing::{ComponentTiming, PerformanceMonitor};
