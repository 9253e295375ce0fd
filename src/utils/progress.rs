//! Progress bars shared by the search and encode commands.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub const PROGRESS_CHARS: &str = "##-";

/// Overall crf search bar, length is set by the search itself.
pub const SEARCH_TEMPLATE: &str =
    "{spinner:.cyan.bold} {elapsed_precise:.bold} {wide_bar:.cyan/blue} ({msg}eta {eta})";

/// Full encode bar.
pub const ENCODE_TEMPLATE: &str =
    "{spinner:.cyan.bold} {elapsed_precise:.bold} {wide_bar:.cyan/blue} ({percent}%, eta {eta})";

fn styled(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(PROGRESS_CHARS)
}

#[must_use]
pub fn create_search_bar() -> ProgressBar {
    let pb = ProgressBar::new(12).with_style(styled(SEARCH_TEMPLATE));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[must_use]
pub fn create_encode_bar(length: u64) -> ProgressBar {
    let pb = ProgressBar::new(length).with_style(styled(ENCODE_TEMPLATE));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
