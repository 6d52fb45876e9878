//! Express (minimal Node.js web framework)

use super::{FrameworkSignature, HeaderPattern, VersionPattern};
use crate::stack::Framework;

pub const SIGNATURE: FrameworkSignature = FrameworkSignature {
    framework: Framework::Express,
    display_name: "Express.js",
    description: "Fast, unopinionated Node.js web framework",
    file_names: &["package.json", "app.js", "server.js", "index.js"],
    package_names: &["express"],
    env_keys: &["NODE_ENV"],
    process_patterns: &[r"node.*express", r"node.*app\.js", r"node.*server\.js", r"npm.*start"],
    http_headers: &[HeaderPattern {
        name: "x-powered-by",
        contains: "express",
    }],
    endpoints: &[],
    common_ports: &[3000, 4000, 8080],
    version_patterns: &[VersionPattern {
        manifest: "package.json",
        pattern: r#""express"\s*:\s*"[^"\d]*(\d+\.\d+(?:\.\d+)?)"#,
    }],
};
