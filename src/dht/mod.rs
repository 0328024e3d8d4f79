//! Ring membership: identifier arithmetic, peer records, and the
//! per-node routing state the lookup algorithm runs on.
mod finger;
mod peer;
mod rid;
mod ring;
mod successor;

pub use finger::FingerTable;
pub use peer::derive_id;
pub use peer::Peer;
pub use rid::in_arc_half_open;
pub use rid::in_arc_open;
pub use rid::RingId;
pub use rid::SortClockwise;
pub use ring::LookupStep;
pub use ring::RingState;
pub use successor::SuccessorList;
