pub mod anchor;
pub mod builder;
pub mod correlation;

pub use anchor::{best_price_legs, select_anchors, AnchorRule};
pub use builder::{build_parlays, GameLinks, ParlaySettings};
pub use correlation::{CorrelationLink, CorrelationTable};
