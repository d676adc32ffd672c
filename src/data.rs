//! MLM batches and the corpus-reader boundary
//!
//! The corpus pipeline upstream of the controller owns tokenization,
//! sharding, and batch order. The controller consumes it through
//! [`CorpusReader`]: an infinite, restartable stream of [`MlmBatch`]es.
//! [`ShardCorpus`] is the bundled implementation: it cycles over token
//! shards in shard-then-shuffle order and applies dynamic masking.

use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};

/// A batch of masked-language-model training data.
///
/// All three buffers are `batch_size * seq_len` long, flattened row-major.
/// `input_ids` is the corrupted stream fed to the backbone; `target_ids`
/// holds the original tokens; `mask_flags` marks exactly the positions whose
/// prediction contributes to the objective.
#[derive(Debug, Clone)]
pub struct MlmBatch {
    /// Corrupted token IDs (backbone input)
    pub input_ids: Vec<u32>,
    /// Original token IDs (prediction targets)
    pub target_ids: Vec<u32>,
    /// True at positions that contribute to loss
    pub mask_flags: Vec<bool>,
    /// Number of rows
    pub batch_size: usize,
    /// Tokens per row
    pub seq_len: usize,
}

impl MlmBatch {
    /// Create a batch from flattened buffers
    pub fn new(
        input_ids: Vec<u32>,
        target_ids: Vec<u32>,
        mask_flags: Vec<bool>,
        batch_size: usize,
        seq_len: usize,
    ) -> Self {
        debug_assert_eq!(input_ids.len(), batch_size * seq_len);
        debug_assert_eq!(target_ids.len(), batch_size * seq_len);
        debug_assert_eq!(mask_flags.len(), batch_size * seq_len);
        Self { input_ids, target_ids, mask_flags, batch_size, seq_len }
    }

    /// Total number of token positions
    pub fn num_positions(&self) -> usize {
        self.batch_size * self.seq_len
    }

    /// Number of positions contributing to loss
    pub fn masked_count(&self) -> usize {
        self.mask_flags.iter().filter(|&&m| m).count()
    }

    /// Row-slice of this batch for replica `index` of `shards`.
    ///
    /// Rows are split as evenly as possible; trailing replicas may receive
    /// an empty shard when `batch_size < shards`.
    pub fn shard(&self, index: usize, shards: usize) -> MlmBatch {
        let start_row = index * self.batch_size / shards;
        let end_row = (index + 1) * self.batch_size / shards;
        let start = start_row * self.seq_len;
        let end = end_row * self.seq_len;
        MlmBatch {
            input_ids: self.input_ids[start..end].to_vec(),
            target_ids: self.target_ids[start..end].to_vec(),
            mask_flags: self.mask_flags[start..end].to_vec(),
            batch_size: end_row - start_row,
            seq_len: self.seq_len,
        }
    }
}

/// An infinite, restartable source of training batches.
///
/// Batch order is owned entirely by the implementation; the training driver
/// only pulls.
pub trait CorpusReader {
    /// Produce the next batch
    fn next_batch(&mut self) -> Result<MlmBatch>;
}

/// Dynamic-masking policy applied to each drawn sequence
#[derive(Debug, Clone)]
pub struct MaskingConfig {
    /// Probability a position is selected for prediction
    pub mask_prob: f32,
    /// Token substituted at masked positions
    pub mask_token_id: u32,
    /// Vocabulary size, for random replacement
    pub vocab_size: u32,
}

impl MaskingConfig {
    /// Standard BERT-style policy: 15% of positions selected
    pub fn new(mask_token_id: u32, vocab_size: u32) -> Self {
        Self { mask_prob: 0.15, mask_token_id, vocab_size }
    }

    /// Override the selection probability
    pub fn with_mask_prob(mut self, prob: f32) -> Self {
        self.mask_prob = prob;
        self
    }
}

/// Corpus reader over pre-tokenized shard files.
///
/// Shards are consumed one at a time; within a pass shards are visited in a
/// shuffled order, and the order is reshuffled when all shards are
/// exhausted, so the stream never ends. Masking is re-drawn every time a
/// sequence is emitted.
pub struct ShardCorpus {
    shards: Vec<Vec<u32>>,
    seq_len: usize,
    batch_size: usize,
    masking: MaskingConfig,
    rng: StdRng,
    order: Vec<usize>,
    shard_idx: usize,
    cursor: usize,
}

impl ShardCorpus {
    /// Load shard files (little-endian u32 token streams) from disk
    pub fn load(
        paths: &[PathBuf],
        seq_len: usize,
        batch_size: usize,
        masking: MaskingConfig,
        seed: u64,
    ) -> Result<Self> {
        let mut shards = Vec::with_capacity(paths.len());
        for path in paths {
            shards.push(read_token_shard(path)?);
        }
        Self::from_tokens(shards, seq_len, batch_size, masking, seed)
    }

    /// Build a corpus from in-memory token shards
    pub fn from_tokens(
        shards: Vec<Vec<u32>>,
        seq_len: usize,
        batch_size: usize,
        masking: MaskingConfig,
        seed: u64,
    ) -> Result<Self> {
        if seq_len == 0 || batch_size == 0 {
            return Err(Error::Corpus("sequence length and batch size must be positive".into()));
        }
        let usable: usize = shards.iter().map(|s| s.len() / seq_len).sum();
        if usable == 0 {
            return Err(Error::Corpus(format!(
                "shards hold no complete sequence of length {seq_len}"
            )));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> =
            (0..shards.len()).filter(|&i| shards[i].len() >= seq_len).collect();
        order.shuffle(&mut rng);
        Ok(Self { shards, seq_len, batch_size, masking, rng, order, shard_idx: 0, cursor: 0 })
    }

    fn next_sequence(&mut self) -> Vec<u32> {
        loop {
            let shard = &self.shards[self.order[self.shard_idx]];
            if self.cursor + self.seq_len <= shard.len() {
                let seq = shard[self.cursor..self.cursor + self.seq_len].to_vec();
                self.cursor += self.seq_len;
                return seq;
            }
            // Shard exhausted: advance, reshuffling when the pass completes.
            self.cursor = 0;
            self.shard_idx += 1;
            if self.shard_idx >= self.order.len() {
                self.shard_idx = 0;
                self.order.shuffle(&mut self.rng);
            }
        }
    }

    fn corrupt(&mut self, original: u32) -> u32 {
        let roll: f32 = self.rng.gen();
        if roll < 0.8 {
            self.masking.mask_token_id
        } else if roll < 0.9 {
            self.rng.gen_range(0..self.masking.vocab_size)
        } else {
            original
        }
    }
}

impl CorpusReader for ShardCorpus {
    fn next_batch(&mut self) -> Result<MlmBatch> {
        let positions = self.batch_size * self.seq_len;
        let mut input_ids = Vec::with_capacity(positions);
        let mut target_ids = Vec::with_capacity(positions);
        let mut mask_flags = Vec::with_capacity(positions);

        for _ in 0..self.batch_size {
            let seq = self.next_sequence();
            for &token in &seq {
                let masked = self.rng.gen::<f32>() < self.masking.mask_prob;
                target_ids.push(token);
                mask_flags.push(masked);
                let input = if masked { self.corrupt(token) } else { token };
                input_ids.push(input);
            }
        }

        Ok(MlmBatch::new(input_ids, target_ids, mask_flags, self.batch_size, self.seq_len))
    }
}

fn read_token_shard(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Corpus(format!("failed to read shard {}: {e}", path.display())))?;
    if bytes.len() % 4 != 0 {
        return Err(Error::Corpus(format!(
            "shard {} is not a whole number of u32 tokens",
            path.display()
        )));
    }
    Ok(bytes.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Sharding a batch partitions its rows exactly
        #[test]
        fn shard_partitions_rows(
            batch_size in 1usize..16,
            seq_len in 1usize..8,
            shards in 1usize..6,
        ) {
            let n = batch_size * seq_len;
            let batch = MlmBatch::new(
                (0..n as u32).collect(),
                (0..n as u32).collect(),
                vec![false; n],
                batch_size,
                seq_len,
            );
            let mut rows = 0;
            let mut recombined = Vec::new();
            for i in 0..shards {
                let piece = batch.shard(i, shards);
                rows += piece.batch_size;
                recombined.extend(piece.input_ids);
            }
            prop_assert_eq!(rows, batch_size);
            prop_assert_eq!(recombined, batch.input_ids);
        }
    }
}
