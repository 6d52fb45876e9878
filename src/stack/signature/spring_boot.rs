//! Spring Boot (JVM microservice framework)

use super::{FrameworkSignature, VersionPattern};
use crate::stack::Framework;

pub const SIGNATURE: FrameworkSignature = FrameworkSignature {
    framework: Framework::SpringBoot,
    display_name: "Spring Boot",
    description: "Java-based framework for microservices",
    file_names: &["pom.xml", "build.gradle", "build.gradle.kts"],
    package_names: &["org.springframework.boot", "spring-boot-starter"],
    env_keys: &["SPRING_PROFILES_ACTIVE", "SPRING_APPLICATION_NAME"],
    process_patterns: &[r"java.*spring-boot", r"java.*-jar.*\.jar"],
    http_headers: &[],
    endpoints: &["/actuator/health"],
    common_ports: &[8080, 8443, 9090],
    version_patterns: &[
        VersionPattern {
            manifest: "pom.xml",
            pattern: r"<spring-boot\.version>(\d+\.\d+(?:\.\d+)?)</spring-boot\.version>",
        },
        VersionPattern {
            manifest: "build.gradle",
            pattern: r#"org\.springframework\.boot['"]?\s*\)?\s*version\s*['"](\d+\.\d+(?:\.\d+)?)"#,
        },
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_gradle_plugin_version_pattern() {
        let re = Regex::new(SIGNATURE.version_patterns[1].pattern).unwrap();
        let caps = re
            .captures("plugins {\n  id 'org.springframework.boot' version '3.2.1'\n}")
            .unwrap();
        assert_eq!(&caps[1], "3.2.1");
    }

    #[test]
    fn test_spring_boot_has_actuator_endpoint() {
        assert_eq!(SIGNATURE.endpoints, &["/actuator/health"]);
    }
}
