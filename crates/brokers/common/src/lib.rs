pub mod simulated;

pub use simulated::{FailureFixture, SimulatedConnectorFactory, SimulatedVenue, VenueFixture};
