pub mod negotiation;
pub mod outcome;
