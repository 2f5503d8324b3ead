pub mod blocks;
pub mod overlap;
pub mod slots;
