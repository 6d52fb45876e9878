use super::Language;

crate::define_id_enum! {
    /// Web framework a target can be classified as
    Framework {
        Flask => "flask" : "Flask",
        Django => "django" : "Django",
        FastApi => "fastapi" : "FastAPI",
        Express => "express" : "Express" | "express.js" | "expressjs",
        NestJs => "nestjs" : "NestJS" | "nest",
        SpringBoot => "spring_boot" : "Spring Boot" | "spring-boot" | "springboot",
        Unknown => "unknown" : "Unknown",
    }
}

impl Framework {
    pub fn language(&self) -> Language {
        match self {
            Framework::Flask | Framework::Django | Framework::FastApi => Language::Python,
            Framework::Express | Framework::NestJs => Language::NodeJs,
            Framework::SpringBoot => Language::Java,
            Framework::Unknown => Language::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Framework::Unknown
    }

    /// Every classifiable framework, excluding `Unknown`.
    pub fn known() -> impl Iterator<Item = Framework> {
        Self::all_variants().iter().copied().filter(Framework::is_known)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framework_serialization() {
        assert_eq!(
            serde_json::to_string(&Framework::SpringBoot).unwrap(),
            "\"spring_boot\""
        );
        assert_eq!(
            serde_json::to_string(&Framework::FastApi).unwrap(),
            "\"fastapi\""
        );
    }

    #[test]
    fn test_framework_deserialization_rejects_unknown_names() {
        let parsed: Framework = serde_json::from_str("\"nestjs\"").unwrap();
        assert_eq!(parsed, Framework::NestJs);
        assert!(serde_json::from_str::<Framework>("\"rails\"").is_err());
    }

    #[test]
    fn test_framework_name_and_aliases() {
        assert_eq!(Framework::SpringBoot.name(), "Spring Boot");
        assert_eq!(Framework::from_name("spring-boot"), Some(Framework::SpringBoot));
        assert_eq!(Framework::from_name("EXPRESS"), Some(Framework::Express));
        assert_eq!(Framework::from_name("rails"), None);
    }

    #[test]
    fn test_language_mapping_is_total() {
        for fw in Framework::all_variants() {
            let lang = fw.language();
            assert_eq!(lang == Language::Unknown, *fw == Framework::Unknown);
        }
    }

    #[test]
    fn test_known_excludes_unknown() {
        let known: Vec<_> = Framework::known().collect();
        assert_eq!(known.len(), 6);
        assert!(!known.contains(&Framework::Unknown));
    }
}
