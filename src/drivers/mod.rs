//! Concrete light backends.
//!
//! Hardware candidates are tried in the order returned by
//! [`hardware_candidates`]; the simulated backend is the last resort and is
//! owned separately by the device manager.

pub mod blynclight;
pub mod hid_io;
pub mod raw_hid;
pub mod simulated;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::light::LightBackend;

use self::{blynclight::LibraryBackend, hid_io::HidBus, raw_hid::RawHidBackend};

/// Hardware backends in preference order, sharing one HID bus.
pub fn hardware_candidates(bus: Arc<dyn HidBus>) -> Vec<Box<dyn LightBackend>> {
    vec![
        Box::new(LibraryBackend::new(bus.clone())),
        Box::new(RawHidBackend::new(bus)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::testing::FakeBus;

    #[test]
    fn library_backend_is_preferred() {
        let names: Vec<_> = hardware_candidates(Arc::new(FakeBus::default()))
            .iter()
            .map(|b| b.name())
            .collect();
        assert_eq!(names, vec!["blynclight-library", "raw-hid"]);
    }
}
