//! Static asset serving
//!
//! Any path without a route resolves against the static directory; directory
//! requests fall back to their `index.html`.

use std::path::Path;
use tower_http::services::ServeDir;

/// Default static directory, relative to the working directory
pub const DEFAULT_STATIC_DIR: &str = "public";

pub fn static_service(dir: &Path) -> ServeDir {
    ServeDir::new(dir).append_index_html_on_directories(true)
}
