pub mod availability;
pub mod bandits;
pub mod distributions;
pub mod experiment;
pub mod factorization;
pub mod index;
pub mod io;
pub mod knn;
pub mod metrics;
pub mod preferences;
pub mod recommenders;
pub mod selector;
pub mod similarity;
pub mod simulation;
pub mod types;

pub use crate::preferences::Preferences;
pub use crate::recommenders::InteractiveRecommender;
pub use crate::selector::AlgorithmSelector;
pub use crate::simulation::RecommendationLoop;
pub use crate::types::Seeds;
