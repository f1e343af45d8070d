pub mod analysis; // Single-document Convert → Extract → Analyze → Score
pub mod cancel;
pub mod intake; // Validation and media typing
pub mod transfer; // Batch queue and transfer orchestrator
