pub mod callgraph;
pub mod descriptor;
pub mod interfaces;
pub mod model;
pub mod resolver;
pub mod roots;
