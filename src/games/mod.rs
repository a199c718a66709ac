//! Games shipped with the harness.

pub mod rock_paper_scissors;
