//! Line-window chunking and chunk identity.

use refresh_types::ChunkingSettings;

/// One chunk of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Window position within the file
    pub index: u32,
    /// First line (1-based, inclusive)
    pub start_line: u32,
    /// Last line (1-based, inclusive)
    pub end_line: u32,
    pub text: String,
}

/// Chunker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Lines per window (default: 60).
    pub max_lines: usize,
    /// Lines shared by consecutive windows (default: 10). Must be below `max_lines`.
    pub overlap_lines: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_lines: 60,
            overlap_lines: 10,
        }
    }
}

impl From<&ChunkingSettings> for ChunkerConfig {
    fn from(settings: &ChunkingSettings) -> Self {
        Self {
            max_lines: settings.max_lines,
            overlap_lines: settings.overlap_lines,
        }
    }
}

impl ChunkerConfig {
    fn step(&self) -> usize {
        self.max_lines.saturating_sub(self.overlap_lines).max(1)
    }
}

/// Split `source` into overlapping line windows.
///
/// Whitespace-only windows are dropped; window indexes stay positional so a
/// chunk keeps its id when an unrelated window becomes blank.
pub fn chunk_source(source: &str, config: &ChunkerConfig) -> Vec<Chunk> {
    let lines: Vec<&str> = source.lines().collect();
    let max_lines = config.max_lines.max(1);
    let step = config.step();

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0u32;

    while start < lines.len() {
        let end = (start + max_lines).min(lines.len());
        let text = lines[start..end].join("\n");

        if !text.trim().is_empty() {
            chunks.push(Chunk {
                index,
                start_line: line_number(start + 1),
                end_line: line_number(end),
                text,
            });
        }

        if end == lines.len() {
            break;
        }
        start += step;
        index += 1;
    }

    chunks
}

fn line_number(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Stable vector id for a chunk position: first 8 bytes of
/// `blake3(reference ‖ path ‖ index)`.
pub fn chunk_id(reference: &str, relative_path: &str, index: u32) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(reference.as_bytes());
    hasher.update(&[0]);
    hasher.update(relative_path.as_bytes());
    hasher.update(&[0]);
    hasher.update(&index.to_le_bytes());

    let mut id = [0u8; 8];
    id.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
    u64::from_le_bytes(id)
}

/// Hex blake3 digest of the chunk text.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}
