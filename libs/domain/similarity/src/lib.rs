//! Scores extracted entities against candidate existing pages and decides
//! whether an entity already has a page in the store.

mod jaro_winkler;
mod matcher;
mod normalize;

pub use matcher::{Candidate, MatchDecision, MatcherConfig, SimilarityMatcher};
pub use normalize::{has_token_overlap, normalize_title};
