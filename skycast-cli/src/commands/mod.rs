pub mod cache;
pub mod serve;
pub mod status;
