//! DataLoader for batching and iterating over training data
//!
//! Provides efficient batching for GAN training with support for:
//! - Random shuffling
//! - Drop last incomplete batch
//! - Iteration over paired low/high-resolution batches

use rand::seq::SliceRandom;
use tch::Tensor;

use super::dataset::PairedImageDataset;

/// One batch of paired images with a stable leading batch dimension.
pub struct PairedBatch {
    /// High-resolution images, shape (batch, 3, crop, crop)
    pub hr: Tensor,
    /// Low-resolution counterparts, shape (batch, 3, crop / upscale, crop / upscale)
    pub lr: Tensor,
}

/// DataLoader for iterating over paired image batches
pub struct DataLoader {
    /// High-resolution tensor of shape (num_pairs, 3, crop, crop)
    hr: Tensor,
    /// Low-resolution tensor of shape (num_pairs, 3, crop / upscale, crop / upscale)
    lr: Tensor,
    /// Batch size
    batch_size: usize,
    /// Whether to shuffle data each epoch
    shuffle: bool,
    /// Whether to drop the last incomplete batch
    drop_last: bool,
    /// Current indices for iteration
    indices: Vec<i64>,
    /// Current position in iteration
    current_idx: usize,
}

impl DataLoader {
    /// Create a new DataLoader over paired tensors.
    ///
    /// Both tensors must share the same leading dimension.
    pub fn new(hr: Tensor, lr: Tensor, batch_size: usize, shuffle: bool, drop_last: bool) -> Self {
        assert_eq!(
            hr.size()[0],
            lr.size()[0],
            "hr and lr must pair up one-to-one"
        );
        let num_samples = hr.size()[0];
        let indices: Vec<i64> = (0..num_samples).collect();

        let mut loader = Self {
            hr,
            lr,
            batch_size,
            shuffle,
            drop_last,
            indices,
            current_idx: 0,
        };

        if shuffle {
            loader.shuffle_indices();
        }

        loader
    }

    /// Build a loader that consumes a dataset.
    pub fn from_dataset(
        dataset: PairedImageDataset,
        batch_size: usize,
        shuffle: bool,
        drop_last: bool,
    ) -> Self {
        Self::new(dataset.hr, dataset.lr, batch_size, shuffle, drop_last)
    }

    /// Get the number of batches per epoch
    pub fn num_batches(&self) -> usize {
        let num_samples = self.indices.len();
        if self.drop_last {
            num_samples / self.batch_size
        } else {
            num_samples.div_ceil(self.batch_size)
        }
    }

    /// Get total number of image pairs
    pub fn num_samples(&self) -> usize {
        self.indices.len()
    }

    /// Shuffle indices for a new epoch
    fn shuffle_indices(&mut self) {
        let mut rng = rand::thread_rng();
        self.indices.shuffle(&mut rng);
    }

    /// Reset for new epoch
    pub fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffle {
            self.shuffle_indices();
        }
    }

    /// Get next batch
    ///
    /// Returns None when epoch is complete
    pub fn next_batch(&mut self) -> Option<PairedBatch> {
        let num_samples = self.indices.len();
        let start = self.current_idx;

        if start >= num_samples {
            return None;
        }

        let end = (start + self.batch_size).min(num_samples);
        let actual_batch_size = end - start;

        // Skip incomplete batch if drop_last
        if self.drop_last && actual_batch_size < self.batch_size {
            return None;
        }

        let idx = Tensor::from_slice(&self.indices[start..end]);
        let batch = PairedBatch {
            hr: self.hr.index_select(0, &idx),
            lr: self.lr.index_select(0, &idx),
        };

        self.current_idx = end;
        Some(batch)
    }

    /// Iterate over all batches (consuming iterator style)
    pub fn iter(&mut self) -> DataLoaderIter<'_> {
        self.reset();
        DataLoaderIter { loader: self }
    }
}

/// Iterator adapter for DataLoader
pub struct DataLoaderIter<'a> {
    loader: &'a mut DataLoader,
}

impl Iterator for DataLoaderIter<'_> {
    type Item = PairedBatch;

    fn next(&mut self) -> Option<Self::Item> {
        self.loader.next_batch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    fn dummy_pair(n: i64) -> (Tensor, Tensor) {
        let hr = Tensor::zeros([n, 3, 8, 8], (Kind::Float, Device::Cpu));
        let lr = Tensor::zeros([n, 3, 2, 2], (Kind::Float, Device::Cpu));
        (hr, lr)
    }

    #[test]
    fn test_dataloader_basic() {
        let (hr, lr) = dummy_pair(10);
        let mut loader = DataLoader::new(hr, lr, 3, false, false);

        assert_eq!(loader.num_batches(), 4); // ceil(10/3) = 4
        assert_eq!(loader.num_samples(), 10);

        let mut batch_count = 0;
        while let Some(batch) = loader.next_batch() {
            batch_count += 1;
            if batch_count < 4 {
                assert_eq!(batch.hr.size()[0], 3);
            } else {
                assert_eq!(batch.hr.size()[0], 1); // Last batch has 1 pair
            }
            assert_eq!(batch.hr.size()[0], batch.lr.size()[0]);
        }
        assert_eq!(batch_count, 4);
    }

    #[test]
    fn test_dataloader_drop_last() {
        let (hr, lr) = dummy_pair(10);
        let mut loader = DataLoader::new(hr, lr, 3, false, true);

        assert_eq!(loader.num_batches(), 3); // floor(10/3) = 3

        let mut batch_count = 0;
        while let Some(batch) = loader.next_batch() {
            batch_count += 1;
            assert_eq!(batch.hr.size()[0], 3);
        }
        assert_eq!(batch_count, 3);
    }

    #[test]
    fn test_dataloader_iter() {
        let (hr, lr) = dummy_pair(10);
        let mut loader = DataLoader::new(hr, lr, 5, false, true);

        let batches: Vec<_> = loader.iter().collect();
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn test_pairs_stay_aligned_under_shuffle() {
        // Encode the pair index into the tensors so shuffling can be checked.
        let hr = Tensor::arange(10, (Kind::Float, Device::Cpu))
            .view([10, 1, 1, 1])
            .expand([10, 3, 8, 8], false)
            .contiguous();
        let lr = Tensor::arange(10, (Kind::Float, Device::Cpu))
            .view([10, 1, 1, 1])
            .expand([10, 3, 2, 2], false)
            .contiguous();

        let mut loader = DataLoader::new(hr, lr, 4, true, false);
        for batch in loader.iter() {
            let hr_ids = batch.hr.mean_dim([1i64, 2, 3].as_slice(), false, Kind::Float);
            let lr_ids = batch.lr.mean_dim([1i64, 2, 3].as_slice(), false, Kind::Float);
            let diff: f64 = (&hr_ids - &lr_ids).abs().max().double_value(&[]);
            assert!(diff < 1e-6);
        }
    }

    #[test]
    #[should_panic]
    fn test_mismatched_pair_panics() {
        let hr = Tensor::zeros([10, 3, 8, 8], (Kind::Float, Device::Cpu));
        let lr = Tensor::zeros([8, 3, 2, 2], (Kind::Float, Device::Cpu));
        DataLoader::new(hr, lr, 2, false, false);
    }
}
