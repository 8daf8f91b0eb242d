pub mod cache;
pub mod forecast;
pub mod parameters;

pub use cache::{cache_key, ForecastCache};
pub use forecast::{
    run_forecast, simulate_portfolio, Forecast, ForecastInput, ForecastSummary,
    PortfolioSimulation, SimulationRequest,
};
pub use parameters::ModelParameters;
