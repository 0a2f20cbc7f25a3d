pub mod maintainer;
pub mod tracker;
