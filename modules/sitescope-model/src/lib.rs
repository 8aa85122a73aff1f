pub mod pipeline;
pub mod profile;
pub mod scorer;
pub mod selector;
pub mod store;
pub mod transform;

pub use pipeline::ScanPipeline;
pub use profile::{IdealProfile, ProfileLearner, ReferenceResolution, ResolvedReference};
pub use scorer::{ScoreRow, SimilarityScorer, VetoReason};
pub use selector::{select_city, Candidate, SelectionResult, SelectionRow};
pub use store::{FeatureStore, MemorySink, MemoryStore, OutputSink, SmoothedRow};
pub use transform::TransformStats;
