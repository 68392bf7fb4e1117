pub mod availability;
pub mod synthesizer;

pub use availability::AvailabilityService;
pub use synthesizer::AvailabilitySynthesizer;
