pub mod client;
pub mod mapping_run;

pub use client::{NotionClient, NotionConfig, NotionError, Page, QueryPage};
pub use mapping_run::{apply_mappings, MappingIssue, MappingRun};

pub type Result<T> = std::result::Result<T, NotionError>;
