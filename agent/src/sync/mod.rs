pub mod binding;
pub mod equivalence;
pub mod fsm;
pub mod prompt;
pub mod reconciler;
pub mod transfer;
