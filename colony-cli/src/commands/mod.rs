pub mod apply;
pub mod graph;
pub mod plan;
pub mod render;
pub mod session;
