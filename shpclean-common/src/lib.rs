pub mod algorithms;
pub mod structures;
pub mod utils;
