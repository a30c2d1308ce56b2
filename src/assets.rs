//! Static pages served next to the API, embedded at compile time.

pub const INDEX_HTML: &str = include_str!("../assets/index.html");
pub const TERMS_HTML: &str = include_str!("../assets/terms.html");
pub const PRIVACY_HTML: &str = include_str!("../assets/privacy.html");
pub const INSTALL_SH: &str = include_str!("../assets/install.sh");

pub const HTML: &str = "text/html";
pub const SHELL_SCRIPT: &str = "text/plain; charset=utf-8";
