// Mastodon API client: identity lookup and boosting.
//
// `traits` holds the SocialClient seam the cycle depends on; `client` is the
// reqwest implementation against a real instance.

pub mod client;
pub mod traits;

pub use traits::{Account, RepostError, SocialClient};
