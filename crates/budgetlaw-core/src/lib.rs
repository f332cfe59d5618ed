pub mod pool;
pub mod record;
pub mod schema;
pub mod segment;
pub mod taxonomy;
pub mod validate;

pub use pool::{BoundedPool, Progress};
pub use record::{Action, CandidateRecord, DocId, EnrichedRecord, ProposalRecord, Segment};
pub use schema::proposals;
pub use segment::{Segmenter, segment_document, strip_ordinal_marker};
pub use taxonomy::{Taxonomy, TaxonomyError};
pub use validate::{Rejection, ValidationGate};
