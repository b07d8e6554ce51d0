pub mod sleep;
pub mod supply;
