pub mod paths;
pub mod portfolio;
pub mod statistics;
