//! CAN broadcast manager.
//!
//! canbcm keeps cyclic CAN transmissions running and watches received
//! frames for relevant content changes, reporting only what changed, what
//! timed out and what expired.
//!
//! # Crate Structure
//!
//! - [`transport`]: CAN frame types, the transport trait and a virtual bus
//! - [`frame`]: control messages and their binary wire format
//! - [`manager`]: the broadcast manager itself (behind `manager` feature)

/// Re-export transport types.
pub mod transport {
    pub use canbcm_transport::*;
}

/// Re-export message and codec types.
pub mod frame {
    pub use canbcm_frame::*;
}

/// Re-export broadcast manager types (requires `manager` feature).
#[cfg(feature = "manager")]
pub mod manager {
    pub use canbcm_manager::*;
}
