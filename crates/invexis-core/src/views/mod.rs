pub mod headlines;
pub mod sentiment;
