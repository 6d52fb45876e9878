//! NestJS (TypeScript framework on top of Express/Fastify)

use super::{FrameworkSignature, VersionPattern};
use crate::stack::Framework;

// No header pattern: NestJS answers with Express' X-Powered-By, which would
// make every Express app tie with it.
pub const SIGNATURE: FrameworkSignature = FrameworkSignature {
    framework: Framework::NestJs,
    display_name: "NestJS",
    description: "Progressive Node.js framework",
    file_names: &["package.json", "nest-cli.json"],
    package_names: &["@nestjs/core", "@nestjs/common"],
    env_keys: &[],
    process_patterns: &[r"node.*nest", r"nest\s+start", r"node.*dist/main"],
    http_headers: &[],
    endpoints: &[],
    common_ports: &[3000, 8080],
    version_patterns: &[VersionPattern {
        manifest: "package.json",
        pattern: r#""@nestjs/core"\s*:\s*"[^"\d]*(\d+\.\d+(?:\.\d+)?)"#,
    }],
};
