pub mod error;
pub mod records;
pub mod verdict;
