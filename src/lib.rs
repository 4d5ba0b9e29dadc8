// Ambassador: boosts popular public posts from a Mastodon mirror database.
//
// This is the library root. Each module corresponds to one stage of the
// boost cycle, leaf first: storage, threshold, selection, reposting, and
// the cycle orchestrator that ties them together.

pub mod actuator;
pub mod config;
pub mod cycle;
pub mod db;
pub mod mastodon;
pub mod selection;
pub mod threshold;
