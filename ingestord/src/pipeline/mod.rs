//! Pipeline Controller and Scheduling Kernel: the state machine that runs
//! one pass (`controller`), the run lock that serialises passes
//! (`lock`), the status record it writes on every transition (`status`),
//! and the three scheduler shapes that drive it and the ancillary jobs
//! (`scheduler`).

pub mod controller;
pub mod lock;
pub mod scheduler;
pub mod status;
