//! Execution lanes for independent rows and heads
//!
//! Row batches and heads share no mutable state, so they can be spread over
//! any number of worker lanes. The lane pool is a process-wide rayon pool
//! sized from the detected core topology unless a count is requested.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Serial,
    Parallel,
}

impl ExecutionMode {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "parallel" | "par" => ExecutionMode::Parallel,
            _ => ExecutionMode::Serial,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneCount {
    Auto,
    Fixed(usize),
}

impl LaneCount {
    pub fn from_str(s: &str) -> Self {
        match s.trim().parse::<usize>() {
            Ok(n) if n > 0 => LaneCount::Fixed(n),
            _ => LaneCount::Auto,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaneTopology {
    pub num_cores: usize,
    pub num_physical_cores: usize,
}

impl LaneTopology {
    pub fn detect() -> Self {
        Self {
            num_cores: num_cpus::get(),
            num_physical_cores: num_cpus::get_physical(),
        }
    }

    pub fn recommended_lanes(&self) -> usize {
        self.num_physical_cores.max(1)
    }
}

pub struct LanePool {
    lanes: usize,
    pool: Option<rayon::ThreadPool>,
}

static LANE_POOL: OnceLock<LanePool> = OnceLock::new();

impl LanePool {
    /// Initialise the process-wide pool. Later calls return the first pool.
    pub fn init(count: LaneCount) -> &'static Self {
        LANE_POOL.get_or_init(|| {
            let topology = LaneTopology::detect();
            let lanes = match count {
                LaneCount::Auto => topology.recommended_lanes(),
                LaneCount::Fixed(n) => n,
            };

            let pool = match rayon::ThreadPoolBuilder::new()
                .num_threads(lanes)
                .thread_name(|i| format!("sdpa-lane-{}", i))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    tracing::warn!("Lane pool build failed ({}), using global rayon pool", e);
                    None
                }
            };

            tracing::info!(
                "Lane pool initialized: {} lanes (detected {} cores, {} physical)",
                lanes,
                topology.num_cores,
                topology.num_physical_cores
            );

            Self { lanes, pool }
        })
    }

    pub fn get() -> &'static Self {
        Self::init(LaneCount::Auto)
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Run `op` inside the lane pool so nested rayon iterators use its lanes.
    pub fn install<R, F>(&self, op: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

pub fn init_lanes(count: LaneCount) -> &'static LanePool {
    LanePool::init(count)
}
