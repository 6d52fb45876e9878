//! Django (batteries-included Python framework)

use super::{FrameworkSignature, VersionPattern};
use crate::stack::Framework;

pub const SIGNATURE: FrameworkSignature = FrameworkSignature {
    framework: Framework::Django,
    display_name: "Django",
    description: "High-level Python web framework",
    file_names: &["requirements.txt", "Pipfile", "pyproject.toml", "manage.py"],
    package_names: &["django"],
    env_keys: &["DJANGO_SETTINGS_MODULE", "DJANGO_SECRET_KEY", "DJANGO_DEBUG"],
    process_patterns: &[r"python.*manage\.py", r"django-admin", r"gunicorn.*django"],
    http_headers: &[],
    endpoints: &["/admin/"],
    common_ports: &[8000, 8080],
    version_patterns: &[VersionPattern {
        manifest: "requirements.txt",
        pattern: r"(?i)\bdjango\s*[=><~!]+\s*(\d+\.\d+(?:\.\d+)?)",
    }],
};
