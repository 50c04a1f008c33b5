//! Data module for loading and preprocessing image pairs
//!
//! This module provides:
//! - Folder-based dataset of paired low/high-resolution crops
//! - Range conversions between pixel and network domains
//! - DataLoader for batching image pairs

mod dataset;
mod loader;
mod preprocessing;

pub use dataset::PairedImageDataset;
pub use loader::{DataLoader, DataLoaderIter, PairedBatch};
pub use preprocessing::{centralize, decentralize, rgb_to_tensor, tensor_to_rgb};
