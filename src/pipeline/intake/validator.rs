use super::{IntakePolicy, MediaType, RejectionReason};
use crate::models::SourceDocument;
use crate::pipeline::transfer::Batch;

/// Proof that a candidate passed validation, with its parsed media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub media_type: MediaType,
}

/// Decides whether a candidate may join a batch. Pure: same candidate, same
/// batch contents, same policy, same answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validator {
    policy: IntakePolicy,
}

impl Validator {
    pub fn new(policy: IntakePolicy) -> Self {
        Self { policy }
    }

    /// Checks run in a fixed order; the first failure wins:
    /// type, size, count, duplicate.
    pub fn validate(
        &self,
        candidate: &SourceDocument,
        existing: &Batch,
    ) -> Result<Accepted, RejectionReason> {
        let media_type = MediaType::from_mime(candidate.media_type()).ok_or_else(|| {
            RejectionReason::UnsupportedType {
                media_type: candidate.media_type().to_string(),
            }
        })?;

        if candidate.size_bytes() > self.policy.max_file_bytes {
            return Err(RejectionReason::TooLarge {
                size_bytes: candidate.size_bytes(),
                max_mb: self.policy.max_file_mb(),
            });
        }

        if existing.len() + 1 > self.policy.max_files {
            return Err(RejectionReason::TooMany {
                max_files: self.policy.max_files,
            });
        }

        if existing.contains(candidate.identity()) {
            return Err(RejectionReason::Duplicate {
                name: candidate.name().to_string(),
            });
        }

        Ok(Accepted { media_type })
    }

    /// Single-document path: validate against an empty batch.
    pub fn validate_single(&self, candidate: &SourceDocument) -> Result<Accepted, RejectionReason> {
        self.validate(candidate, &Batch::new(self.policy))
    }
}
