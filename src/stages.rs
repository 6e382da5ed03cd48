pub mod fork;
pub mod middle;
pub mod sink;
pub mod start;
pub mod zip;
