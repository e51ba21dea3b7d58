//! Transport implementations

pub mod http;
pub mod replay;

pub use http::HttpProvider;
pub use replay::ReplayProvider;
