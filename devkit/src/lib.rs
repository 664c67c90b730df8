/*!
GridPulse Devkit

Test and development utilities for the acquisition layer:
- Scripted stub transport (develop and test without a feed server)
- Frame builders matching the wire contract
- Collectors for asserting on delivered samples and snapshots
*/

pub mod collectors;
pub mod frames;
pub mod stub_transport;

pub use collectors::{SampleCollector, SnapshotCollector};
pub use frames::FrameBuilder;
pub use stub_transport::{ConnectOutcome, StubLink, StubTransport};

/// Initializes logging for a test binary. Repeated calls are harmless.
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
