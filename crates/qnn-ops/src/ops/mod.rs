//! Operator parameter records with their init and invoke entry points.

pub mod activation;
pub mod conv;
pub mod conv3d;
pub mod elementwise;
pub mod layout;
pub mod pool;
pub mod resize;
pub mod segment;
