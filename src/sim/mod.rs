pub mod replay;
pub mod simulator;

pub use replay::simulate_policy;
pub use simulator::SimulatedTrade;
