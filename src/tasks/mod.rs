//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is alive.
//!
//! # Tasks
//! - Optimizer: runs memory optimization in bounded batches
//! - Monitor: pushes metrics to observers and raises threshold alerts

mod monitor;
mod optimizer;

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::cache::CacheStore;
use crate::observer::ObserverRegistry;

pub use monitor::{run_monitor_tick, spawn_monitor_task};
pub use optimizer::{run_optimization_pass, spawn_optimizer_task, OPTIMIZE_BATCH_SIZE};

/// Store shared between the cache handle and its tasks.
pub type SharedStore = Arc<RwLock<CacheStore>>;

/// Observers shared between the cache handle and the monitor task.
pub type SharedObservers = Arc<RwLock<ObserverRegistry>>;
