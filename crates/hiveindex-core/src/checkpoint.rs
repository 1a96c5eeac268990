//! Checkpoint replay: bootstrapping from block dump files.
//!
//! A checkpoint directory holds newline-delimited JSON block files named
//! after the last block they contain (`<last_block>.json.lst`). Files are
//! consumed in ascending order. A file that ends at or below the store's
//! last applied block is skipped; for the first file that extends past it,
//! the lines already applied are skipped and the rest is committed in
//! chunks.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::IndexerError;
use crate::processor::BlockProcessor;
use crate::types::{DirtySet, SignedBlock};

/// File name suffix of checkpoint files.
pub const CHECKPOINT_SUFFIX: &str = ".json.lst";

/// A checkpoint file and the number of the last block it contains.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CheckpointFile {
    pub end_block: u64,
    pub path: PathBuf,
}

/// Totals of one replay run.
#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    pub files: usize,
    pub blocks: u64,
    pub skipped_lines: u64,
    pub dirty: DirtySet,
}

/// List checkpoint files in `dir`, ascending by end block.
///
/// Entries whose name is not `<number>.json.lst` are ignored.
pub async fn list_checkpoint_files(dir: &Path) -> Result<Vec<CheckpointFile>, IndexerError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| IndexerError::Checkpoint(format!("{}: {e}", dir.display())))?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| IndexerError::Checkpoint(format!("{}: {e}", dir.display())))?
    {
        let name = entry.file_name();
        let Some(end_block) = name
            .to_str()
            .and_then(|n| n.strip_suffix(CHECKPOINT_SUFFIX))
            .and_then(|n| n.parse::<u64>().ok())
        else {
            continue;
        };
        files.push(CheckpointFile {
            end_block,
            path: entry.path(),
        });
    }
    files.sort();
    Ok(files)
}

/// Lines of a file to skip when the store has applied up to `last_applied`
/// and the previous file ended at `previous_end`.
pub fn lines_to_skip(last_applied: u64, previous_end: u64) -> u64 {
    last_applied.saturating_sub(previous_end)
}

/// Replay every checkpoint file in `dir` not yet fully applied, never past
/// `stop_at`.
pub async fn replay_checkpoints(
    dir: &Path,
    processor: &BlockProcessor,
    chunk_size: usize,
    stop_at: Option<u64>,
) -> Result<ReplayReport, IndexerError> {
    let mut report = ReplayReport::default();
    let mut previous_end = 0;

    for file in list_checkpoint_files(dir).await? {
        let last_applied = processor.store().last_block_number().await?;
        if stop_at.is_some_and(|stop| last_applied >= stop) {
            break;
        }
        if file.end_block > last_applied {
            let skip = lines_to_skip(last_applied, previous_end);
            tracing::info!(
                file = %file.path.display(),
                last_block = last_applied,
                skip,
                "replaying checkpoint file"
            );
            let (blocks, dirty) = replay_file(&file.path, skip, processor, chunk_size, stop_at).await?;
            report.files += 1;
            report.blocks += blocks;
            report.skipped_lines += skip;
            report.dirty.extend(dirty);
        }
        previous_end = file.end_block;
    }
    Ok(report)
}

async fn replay_file(
    path: &Path,
    skip: u64,
    processor: &BlockProcessor,
    chunk_size: usize,
    stop_at: Option<u64>,
) -> Result<(u64, DirtySet), IndexerError> {
    let io_err = |e: std::io::Error| IndexerError::Checkpoint(format!("{}: {e}", path.display()));
    let file = tokio::fs::File::open(path).await.map_err(io_err)?;
    let mut lines = BufReader::new(file).lines();

    for _ in 0..skip {
        if lines.next_line().await.map_err(io_err)?.is_none() {
            break;
        }
    }

    let chunk_size = chunk_size.max(1);
    let mut chunk = Vec::with_capacity(chunk_size);
    let mut applied = 0;
    let mut dirty = DirtySet::new();
    while let Some(line) = lines.next_line().await.map_err(io_err)? {
        if line.trim().is_empty() {
            continue;
        }
        let block: SignedBlock = serde_json::from_str(&line).map_err(|e| {
            IndexerError::Checkpoint(format!("{}: bad block line: {e}", path.display()))
        })?;
        if stop_at.is_some_and(|stop| block.number().is_ok_and(|n| n > stop)) {
            break;
        }
        chunk.push(block);
        if chunk.len() == chunk_size {
            dirty.extend(processor.process_blocks(&chunk).await?);
            applied += chunk.len() as u64;
            chunk.clear();
        }
    }
    if !chunk.is_empty() {
        dirty.extend(processor.process_blocks(&chunk).await?);
        applied += chunk.len() as u64;
    }
    Ok((applied, dirty))
}
