//! Utility module with helper functions
//!
//! This module provides:
//! - Configuration handling
//! - Checkpoint save/load utilities
//! - Epoch sample visualization

mod checkpoint;
mod config;
mod viz;

pub use checkpoint::{
    find_latest_checkpoint, list_checkpoints, load_checkpoint, load_checkpoint_meta,
    save_checkpoint, CheckpointMeta,
};
pub use config::{ensure_config_exists, Config};
pub use viz::EpochVisualizer;
