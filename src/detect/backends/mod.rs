pub mod stub;

pub use stub::StubTagDetector;
