// Watched-interval normalization.

pub mod merge;

pub use merge::{is_normal_form, merge, merge_with, MergePolicy};
