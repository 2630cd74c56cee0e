pub mod labeler;

pub use labeler::{LabelerClient, LabelerError, LabelerResponse};
