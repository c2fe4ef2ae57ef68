//! Machine learning stages for weekly case-count prediction
//!
//! A bagged forest of CART regression trees is fitted on the labeled
//! partition, tuned by grid search, and its rounded predictions for the
//! unlabeled partition are laid onto the submission template.

pub mod model;
pub mod persistence;
pub mod search;
pub mod split;
pub mod submission;
pub mod training;
pub mod tree;

pub use model::{Forest, Hyperparameters, ModelBuilder, TrainingError};
pub use persistence::{PersistedModel, PersistenceError};
pub use search::{KFold, SearchGrid, SearchOutcome, search};
pub use split::{LabelAlignment, LabelTable, LabeledSet, split, train_test_split};
pub use submission::{Submission, SubmissionTemplate, predict_and_reconcile, round_count};
pub use training::{HoldOut, TrainingResult, evaluate, train, train_model};
