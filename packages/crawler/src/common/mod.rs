pub mod records;

pub use records::{
    ImageArtifact, JobPostingRecord, KeywordRecord, MoveDirection, NaturalKey, Record,
    StockMoveRecord,
};
