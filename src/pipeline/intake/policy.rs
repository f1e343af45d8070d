use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Per-path intake limits. Loaded from configuration; the constructors
/// below are the shipped defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakePolicy {
    pub max_file_bytes: u64,
    pub max_files: usize,
}

impl IntakePolicy {
    /// Multi-file upload: 20 MB per file, 15 files per batch.
    pub fn batch() -> Self {
        Self {
            max_file_bytes: 20 * MIB,
            max_files: 15,
        }
    }

    /// Single pitch document: 15 MB, exactly one file.
    pub fn single_document() -> Self {
        Self {
            max_file_bytes: 15 * MIB,
            max_files: 1,
        }
    }

    pub fn max_file_mb(&self) -> u64 {
        self.max_file_bytes / MIB
    }
}

/// A partially specified policy table. Keys left out fall back to the
/// policy it is applied over.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyOverrides {
    pub max_file_bytes: Option<u64>,
    pub max_files: Option<usize>,
}

impl PolicyOverrides {
    pub fn over(self, base: IntakePolicy) -> IntakePolicy {
        IntakePolicy {
            max_file_bytes: self.max_file_bytes.unwrap_or(base.max_file_bytes),
            max_files: self.max_files.unwrap_or(base.max_files),
        }
    }
}
