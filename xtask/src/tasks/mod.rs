pub mod common;
pub mod evaluate;
pub mod inspect;
pub mod predict;
pub mod prepare;
pub mod train;
