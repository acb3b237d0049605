//! Detection model management and inference

pub mod manager;
pub mod yolo;

pub use manager::ModelManager;
pub use yolo::{Candidate, YoloModel};
