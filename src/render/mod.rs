//! Page rendering: the engine capability seam, the serialization
//! scheduler, and the worker service that runs the engine off-loop.

pub mod engine;
pub mod outline;
pub mod scheduler;
pub mod service;

pub use engine::{DocumentInfo, PageRenderEngine, PageSurface, WorkerFault};
pub use outline::OutlineEngine;
pub use scheduler::{RenderJob, RenderScheduler};
pub use service::{RenderResponse, RenderService};
