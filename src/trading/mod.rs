//! Trading logic: basket selection, entry filters, selection, sizing, fills.

mod basket;
mod fill;
mod filter;
mod position_sizer;
mod selector;

pub use basket::{BasketPolicy, TraderBasketSelector};
pub use fill::{FillSimulator, MAX_EFFECTIVE_PRICE};
pub use filter::{FilterDecision, FilterStats, RejectReason, TradeFilterPipeline};
pub use position_sizer::{PositionSizer, SizingMethod, SizingOutcome, StakeProposal};
pub use selector::{SelectionMethod, TradeSelector};
