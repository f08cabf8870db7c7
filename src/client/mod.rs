//! Client-side core: clock synchronization, reconciliation, local fallback,
//! feedback playback sequencing, and the settlement hand-off.

pub mod clock;
pub mod fallback;
pub mod playback;
pub mod reconcile;
pub mod settlement;
