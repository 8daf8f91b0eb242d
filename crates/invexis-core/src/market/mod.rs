pub mod equilibrium;
pub mod returns;
