crate::define_id_enum! {
    /// Language ecosystem a framework runs on
    Language {
        Python => "python" : "Python",
        NodeJs => "nodejs" : "Node.js" | "node" | "javascript",
        Java => "java" : "Java",
        Unknown => "unknown" : "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_serialization() {
        assert_eq!(serde_json::to_string(&Language::NodeJs).unwrap(), "\"nodejs\"");
        assert_eq!(serde_json::to_string(&Language::Python).unwrap(), "\"python\"");
    }

    #[test]
    fn test_language_from_name() {
        assert_eq!(Language::from_name("Node.js"), Some(Language::NodeJs));
        assert_eq!(Language::from_name("node"), Some(Language::NodeJs));
        assert_eq!(Language::from_name("java"), Some(Language::Java));
        assert_eq!("cobol".parse::<Language>().ok(), None);
    }
}
