pub mod line_matcher;
pub mod normalize;

pub use line_matcher::{match_lines, BookPolicy, MatchSettings};
pub use normalize::SynonymTable;
