pub mod dashboard;
pub mod feed;
pub mod listing;
pub mod spend;
