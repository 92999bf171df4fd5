pub mod emergency;
pub mod message;
