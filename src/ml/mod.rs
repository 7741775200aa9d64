pub mod hmm;
pub mod model;
pub mod warning;

pub use hmm::{GaussianHMM, RegimeClassifier, RegimeModel, RegimeRow, RegimeTable, StateOrder};
pub use model::{LogisticWarningModel, WarningModel};
pub use warning::{WarningScore, WarningScorer};
