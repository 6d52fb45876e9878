//! Framework and language identifiers plus the static signature registry.
//!
//! `Framework` and `Language` are closed enums: adding a framework means adding a
//! variant, which the compiler then forces through every exhaustive match (language
//! mapping, signature lookup, instrumentor selection).
//!
//! # Example
//!
//! ```
//! use obsinject::stack::{Framework, Language, SignatureRegistry};
//!
//! let registry = SignatureRegistry::global();
//! let flask = registry.get(Framework::Flask).unwrap();
//! assert_eq!(flask.language(), Language::Python);
//! assert!(flask.env_keys.contains(&"FLASK_APP"));
//! ```

#[macro_use]
pub mod id_enum_macro;

pub mod framework_id;
pub mod language_id;
pub mod registry;
pub mod signature;

pub use framework_id::Framework;
pub use language_id::Language;
pub use registry::SignatureRegistry;
pub use signature::{FrameworkSignature, HeaderPattern, VersionPattern};
