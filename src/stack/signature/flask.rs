//! Flask (Python WSGI micro-framework)

use super::{FrameworkSignature, HeaderPattern, VersionPattern};
use crate::stack::Framework;

pub const SIGNATURE: FrameworkSignature = FrameworkSignature {
    framework: Framework::Flask,
    display_name: "Flask",
    description: "Lightweight Python WSGI web application framework",
    file_names: &[
        "requirements.txt",
        "Pipfile",
        "pyproject.toml",
        "app.py",
        "wsgi.py",
    ],
    package_names: &["flask"],
    env_keys: &["FLASK_APP", "FLASK_ENV", "FLASK_DEBUG"],
    process_patterns: &[r"python.*flask", r"flask\s+run", r"gunicorn.*:app"],
    http_headers: &[
        HeaderPattern {
            name: "server",
            contains: "werkzeug",
        },
        HeaderPattern {
            name: "server",
            contains: "gunicorn",
        },
        HeaderPattern {
            name: "x-powered-by",
            contains: "flask",
        },
    ],
    endpoints: &[],
    common_ports: &[5000, 8000],
    version_patterns: &[
        VersionPattern {
            manifest: "requirements.txt",
            pattern: r"(?i)\bflask\s*[=><~!]+\s*(\d+\.\d+(?:\.\d+)?)",
        },
        VersionPattern {
            manifest: "Pipfile",
            pattern: r#"(?i)\bflask\b.*["'][=><~^]*(\d+\.\d+(?:\.\d+)?)"#,
        },
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flask_env_keys() {
        assert!(SIGNATURE.env_keys.contains(&"FLASK_APP"));
    }

    #[test]
    fn test_flask_default_ports() {
        assert_eq!(SIGNATURE.common_ports[0], 5000);
    }
}
