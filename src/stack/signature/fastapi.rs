//! FastAPI (async Python API framework)

use super::{FrameworkSignature, HeaderPattern, VersionPattern};
use crate::stack::Framework;

pub const SIGNATURE: FrameworkSignature = FrameworkSignature {
    framework: Framework::FastApi,
    display_name: "FastAPI",
    description: "Modern, fast Python web framework",
    file_names: &["requirements.txt", "Pipfile", "pyproject.toml", "main.py"],
    package_names: &["fastapi"],
    env_keys: &["FASTAPI_ENV"],
    process_patterns: &[r"uvicorn.*:app", r"python.*fastapi"],
    http_headers: &[HeaderPattern {
        name: "server",
        contains: "uvicorn",
    }],
    endpoints: &["/docs", "/openapi.json"],
    common_ports: &[8000, 80],
    version_patterns: &[VersionPattern {
        manifest: "requirements.txt",
        pattern: r"(?i)\bfastapi\s*[=><~!]+\s*(\d+\.\d+(?:\.\d+)?)",
    }],
};
