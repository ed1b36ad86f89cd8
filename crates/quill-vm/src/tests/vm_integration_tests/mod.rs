
pub mod data_structures;
pub mod limits;
pub mod tco;
pub mod types;
