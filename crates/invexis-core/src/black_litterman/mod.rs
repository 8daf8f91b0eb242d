//! Black-Litterman blending of equilibrium returns with relative views, and
//! the unconstrained mean-variance weights derived from the posterior.

pub mod blend;
